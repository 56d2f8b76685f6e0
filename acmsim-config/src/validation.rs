//! Custom validation functions for configuration.

use validator::ValidationError;

use crate::link::ModcodConfig;
use crate::scheduler::SchedulerConfig;
use crate::traffic::{SizeConfig, SourceConfig};
use crate::AcmSimConfig;

fn error(code: &'static str, message: String) -> ValidationError {
    ValidationError::new(code).with_message(message.into())
}

/// Validate a `tracing` level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error", "off"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// A MODCOD gives both its payload and its duration, or neither.
pub fn validate_modcod(modcod: &ModcodConfig) -> Result<(), ValidationError> {
    match (modcod.payload_bits, modcod.transmission_time) {
        (None, None) => Ok(()),
        (Some(bits), Some(time)) if bits > 0 && time > 0.0 => Ok(()),
        (Some(_), Some(_)) => Err(error(
            "invalid_modcod",
            format!("MODCOD '{}' needs a positive payload and duration", modcod.name),
        )),
        _ => Err(error(
            "incomplete_modcod",
            format!(
                "MODCOD '{}' sets only one of payload_bits and transmission_time",
                modcod.name
            ),
        )),
    }
}

pub fn validate_quanta(quanta: &[usize]) -> Result<(), ValidationError> {
    if quanta.contains(&0) {
        return Err(ValidationError::new("zero_quantum"));
    }
    Ok(())
}

pub fn validate_size_range(size: &SizeConfig) -> Result<(), ValidationError> {
    if size.min > size.max {
        return Err(error(
            "invalid_size_range",
            format!("packet size range {}..={} is empty", size.min, size.max),
        ));
    }
    Ok(())
}

pub fn validate_source_window(source: &SourceConfig) -> Result<(), ValidationError> {
    match source.stop {
        Some(stop) if stop <= source.start => Err(error(
            "invalid_source_window",
            format!("source stops at {stop} before it starts at {}", source.start),
        )),
        _ => Ok(()),
    }
}

/// Per-queue utility settings name existing QoS classes.
pub fn validate_qos_classes(scheduler: &SchedulerConfig) -> Result<(), ValidationError> {
    match scheduler.qos.iter().find(|q| q.qos >= scheduler.nb_qos) {
        Some(q) => Err(error(
            "unknown_qos_class",
            format!(
                "utility set for QoS class {} but only {} are configured",
                q.qos, scheduler.nb_qos
            ),
        )),
        None => Ok(()),
    }
}

/// Every source and every per-queue setting points at an existing queue.
pub fn validate_queues(config: &AcmSimConfig) -> Result<(), ValidationError> {
    let nb_modcod = config.link.modcods.len();
    let nb_qos = config.scheduler.nb_qos;
    let acm = config.scheduler.algorithm.is_acm();

    for (index, source) in config.traffic.sources.iter().enumerate() {
        if acm && source.modcod >= nb_modcod {
            return Err(error(
                "unknown_queue",
                format!(
                    "source {index} feeds MODCOD {} but the link has {nb_modcod}",
                    source.modcod
                ),
            ));
        }
        if source.qos >= nb_qos {
            return Err(error(
                "unknown_queue",
                format!(
                    "source {index} feeds QoS class {} but only {nb_qos} are configured",
                    source.qos
                ),
            ));
        }
    }
    if let Some(q) = config
        .scheduler
        .qos
        .iter()
        .find(|q| q.modcod.is_some_and(|m| m >= nb_modcod))
    {
        return Err(error(
            "unknown_queue",
            format!(
                "utility set for MODCOD {:?} but the link has {nb_modcod}",
                q.modcod
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels() {
        assert!(validate_log_level("debug").is_ok());
        assert!(validate_log_level("WARN").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }

    #[test]
    fn half_explicit_modcod_is_rejected() {
        let mut modcod = ModcodConfig::named("custom");
        assert!(validate_modcod(&modcod).is_ok());
        modcod.payload_bits = Some(15_200);
        let err = validate_modcod(&modcod).unwrap_err();
        assert_eq!(err.code, "incomplete_modcod");
        modcod.transmission_time = Some(0.01);
        assert!(validate_modcod(&modcod).is_ok());
    }

    #[test]
    fn size_range_must_not_be_empty() {
        assert!(validate_size_range(&SizeConfig::fixed(100)).is_ok());
        assert!(validate_size_range(&SizeConfig { min: 200, max: 100 }).is_err());
    }
}
