//! Alarm engine: raises, tracks, escalates, and resolves alarms; the
//! single source of truth the arbiter polls for "any critical alarm?".

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;

use crate::alarm::config::AlarmConfiguration;
use crate::alarm::dto::{Alarm, AlarmSeverity, AlarmState};
use crate::arbiter::CriticalAlarmSource;
use crate::error::AlarmError;
use crate::events::{Event, EventBus};

#[derive(Debug, Clone, Copy, Default)]
pub struct AlarmStats {
    pub total_raised: usize,
    pub active_count: usize,
    pub resolved_count: usize,
    pub critical_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
}

impl AlarmStats {
    fn bump_active(&mut self, severity: AlarmSeverity) {
        self.active_count += 1;
        match severity {
            AlarmSeverity::Critical => self.critical_count += 1,
            AlarmSeverity::Warning => self.warning_count += 1,
            AlarmSeverity::Info => self.info_count += 1,
        }
    }

    fn unbump_active(&mut self, severity: AlarmSeverity) {
        self.active_count = self.active_count.saturating_sub(1);
        match severity {
            AlarmSeverity::Critical => self.critical_count = self.critical_count.saturating_sub(1),
            AlarmSeverity::Warning => self.warning_count = self.warning_count.saturating_sub(1),
            AlarmSeverity::Info => self.info_count = self.info_count.saturating_sub(1),
        }
    }
}

struct Inner {
    alarms: HashMap<String, Alarm>,
    last_occurrence: HashMap<String, DateTime<Utc>>,
    recurrence_count: HashMap<String, u32>,
    stats: AlarmStats,
}

/// Raises, tracks, de-duplicates, and escalates faults. `has_critical_alarm`
/// is a plain counter read, safe for the arbiter's hot path.
pub struct AlarmEngine {
    config: AlarmConfiguration,
    inner: Mutex<Inner>,
    event_bus: Option<Arc<dyn EventBus>>,
}

impl AlarmEngine {
    pub fn new(config: AlarmConfiguration) -> Self {
        log::info!("AlarmEngine initialized");
        Self {
            config,
            inner: Mutex::new(Inner {
                alarms: HashMap::new(),
                last_occurrence: HashMap::new(),
                recurrence_count: HashMap::new(),
                stats: AlarmStats::default(),
            }),
            event_bus: None,
        }
    }

    /// Publish `alarm.raised`/`alarm.cleared` events to `bus` as alarms
    /// are raised and resolved. The donor's `AlarmManager::publishEvent`
    /// was left as a stub pending EventBus integration; this wires it.
    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn config(&self) -> &AlarmConfiguration {
        &self.config
    }

    /// Raise an occurrence of `code`. Fails with `UnknownCode` if `code`
    /// isn't in the catalog; repeated raises within the recurrence window
    /// are normal operation, not an error.
    pub fn raise_alarm(
        &self,
        code: &str,
        source: &str,
        details: Option<String>,
    ) -> Result<Alarm, AlarmError> {
        let alarm_config = self
            .config
            .get_alarm_config(code)
            .ok_or_else(|| AlarmError::UnknownCode(code.to_string()))?
            .clone();

        let mut inner = self.inner.lock();

        let recurrence = self.check_recurrence(&mut inner, code, alarm_config.recurrence_window_secs);
        let severity = self.config.should_escalate_severity(code, recurrence);

        let mut alarm = Alarm::new(code, &alarm_config.name, severity, source);
        alarm.details = details;
        alarm.recurrence_count = recurrence;
        if recurrence > 1 {
            alarm.last_recurrence = Some(alarm.timestamp);
        }

        inner.stats.total_raised += 1;
        inner.stats.bump_active(severity);

        log::warn!(
            "alarm raised: {} - {} (severity: {:?}, recurrence: {})",
            code,
            alarm_config.name,
            severity,
            recurrence
        );

        inner.alarms.insert(alarm.alarm_id.clone(), alarm.clone());
        drop(inner);

        self.publish("alarm.raised", "AlarmRaised", &alarm, |a| {
            json!({
                "alarm_id": a.alarm_id,
                "alarm_type": a.code,
                "severity": a.severity,
                "message": a.name,
                "source": a.source,
            })
        });

        Ok(alarm)
    }

    fn publish<F>(&self, topic: &str, type_name: &str, alarm: &Alarm, payload: F)
    where
        F: FnOnce(&Alarm) -> serde_json::Value,
    {
        if let Some(bus) = &self.event_bus {
            let event = Event::new(alarm.alarm_id.clone(), type_name, alarm.alarm_id.clone())
                .with_payload(payload(alarm));
            bus.publish(topic, event);
        }
    }

    fn check_recurrence(&self, inner: &mut Inner, code: &str, window_secs: u64) -> u32 {
        let now = Utc::now();
        let count = match inner.last_occurrence.get(code) {
            Some(last) => {
                let elapsed = (now - *last).num_seconds().max(0) as u64;
                if elapsed <= window_secs {
                    inner.recurrence_count.get(code).copied().unwrap_or(0) + 1
                } else {
                    1
                }
            }
            None => 1,
        };
        inner.last_occurrence.insert(code.to_string(), now);
        inner.recurrence_count.insert(code.to_string(), count);
        count
    }

    pub fn get_alarm(&self, alarm_id: &str) -> Option<Alarm> {
        self.inner.lock().alarms.get(alarm_id).cloned()
    }

    /// Every alarm whose state is not RESOLVED, sorted severity-first
    /// (CRITICAL before WARNING before INFO) then insertion order.
    pub fn get_active_alarms(&self) -> Vec<Alarm> {
        let inner = self.inner.lock();
        let mut result: Vec<Alarm> = inner
            .alarms
            .values()
            .filter(|a| a.is_active_set_member())
            .cloned()
            .collect();
        result.sort_by_key(|a| a.severity);
        result
    }

    pub fn get_active_alarms_by_severity(&self, severity: AlarmSeverity) -> Vec<Alarm> {
        self.inner
            .lock()
            .alarms
            .values()
            .filter(|a| a.is_active_set_member() && a.severity == severity)
            .cloned()
            .collect()
    }

    /// Most recent `limit` alarms (0 = unlimited), newest first.
    pub fn get_alarm_history(&self, limit: usize) -> Vec<Alarm> {
        let inner = self.inner.lock();
        let mut result: Vec<Alarm> = inner.alarms.values().cloned().collect();
        result.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if limit > 0 && result.len() > limit {
            result.truncate(limit);
        }
        result
    }

    pub fn acknowledge_alarm(&self, alarm_id: &str, acknowledged_by: &str) -> Result<(), AlarmError> {
        let mut inner = self.inner.lock();
        let alarm = inner
            .alarms
            .get_mut(alarm_id)
            .ok_or_else(|| AlarmError::NotFound(alarm_id.to_string()))?;

        if alarm.state != AlarmState::Active {
            return Err(AlarmError::InvalidTransition {
                alarm_id: alarm_id.to_string(),
                reason: "alarm is not ACTIVE".to_string(),
            });
        }

        alarm.state = AlarmState::Acknowledged;
        alarm.acknowledged_time = Some(Utc::now());
        alarm.acknowledged_by = Some(acknowledged_by.to_string());
        log::info!("alarm acknowledged: {} by {}", alarm_id, acknowledged_by);
        Ok(())
    }

    pub fn resolve_alarm(&self, alarm_id: &str) -> Result<(), AlarmError> {
        let mut inner = self.inner.lock();
        let alarm = inner
            .alarms
            .get_mut(alarm_id)
            .ok_or_else(|| AlarmError::NotFound(alarm_id.to_string()))?;

        if alarm.state == AlarmState::Resolved {
            return Err(AlarmError::InvalidTransition {
                alarm_id: alarm_id.to_string(),
                reason: "alarm already resolved".to_string(),
            });
        }

        let severity = alarm.severity;
        alarm.state = AlarmState::Resolved;
        alarm.resolved_time = Some(Utc::now());
        let resolved = alarm.clone();

        inner.stats.unbump_active(severity);
        inner.stats.resolved_count += 1;
        drop(inner);

        log::info!("alarm resolved: {}", alarm_id);
        self.publish("alarm.cleared", "AlarmCleared", &resolved, |a| {
            json!({
                "alarm_id": a.alarm_id,
                "alarm_type": a.code,
                "cleared_by": "system",
            })
        });
        Ok(())
    }

    /// Resolve every still-active alarm. Returns the number resolved.
    pub fn reset_all_alarms(&self) -> usize {
        let mut inner = self.inner.lock();
        let ids: Vec<String> = inner
            .alarms
            .iter()
            .filter(|(_, a)| a.is_active_set_member())
            .map(|(id, _)| id.clone())
            .collect();

        let now = Utc::now();
        for id in &ids {
            if let Some(alarm) = inner.alarms.get_mut(id) {
                alarm.state = AlarmState::Resolved;
                alarm.resolved_time = Some(now);
            }
        }

        let count = ids.len();
        inner.stats.active_count = 0;
        inner.stats.critical_count = 0;
        inner.stats.warning_count = 0;
        inner.stats.info_count = 0;
        inner.stats.resolved_count += count;

        log::info!("reset {} alarms", count);
        count
    }

    pub fn get_statistics(&self) -> AlarmStats {
        self.inner.lock().stats
    }

    pub fn has_critical_alarm(&self) -> bool {
        self.inner.lock().stats.critical_count > 0
    }
}

impl CriticalAlarmSource for AlarmEngine {
    fn has_critical_alarm(&self) -> bool {
        AlarmEngine::has_critical_alarm(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::config::AlarmConfiguration;

    fn engine_with(yaml: &str) -> AlarmEngine {
        let mut cfg = AlarmConfiguration::new();
        cfg.load_from_str(yaml).unwrap();
        AlarmEngine::new(cfg)
    }

    const SAMPLE: &str = r#"
version: "1.0"
alarms:
  - code: "W001"
    name: "Battery Low"
    severity: "WARNING"
    recurrence_window_secs: 60
    recurrence_threshold: 3
"#;

    #[test]
    fn unknown_code_is_rejected() {
        let engine = engine_with(SAMPLE);
        assert!(engine.raise_alarm("Z999", "test", None).is_err());
    }

    #[test]
    fn recurrence_escalates_to_critical_at_threshold() {
        let engine = engine_with(SAMPLE);
        let a1 = engine.raise_alarm("W001", "test", None).unwrap();
        assert_eq!(a1.severity, AlarmSeverity::Warning);
        assert_eq!(a1.recurrence_count, 1);

        let a2 = engine.raise_alarm("W001", "test", None).unwrap();
        assert_eq!(a2.severity, AlarmSeverity::Warning);
        assert_eq!(a2.recurrence_count, 2);

        let a3 = engine.raise_alarm("W001", "test", None).unwrap();
        assert_eq!(a3.severity, AlarmSeverity::Critical);
        assert_eq!(a3.recurrence_count, 3);

        assert!(engine.has_critical_alarm());
    }

    #[test]
    fn active_set_includes_acknowledged() {
        let engine = engine_with(SAMPLE);
        let a1 = engine.raise_alarm("W001", "test", None).unwrap();
        engine.acknowledge_alarm(&a1.alarm_id, "operator1").unwrap();
        let active = engine.get_active_alarms();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].state, AlarmState::Acknowledged);
    }

    #[test]
    fn resolve_removes_from_active_set_and_critical_count() {
        let engine = engine_with(SAMPLE);
        let a1 = engine.raise_alarm("W001", "test", None).unwrap();
        engine.raise_alarm("W001", "test", None).unwrap();
        let a3 = engine.raise_alarm("W001", "test", None).unwrap();
        assert!(engine.has_critical_alarm());

        engine.resolve_alarm(&a3.alarm_id).unwrap();
        assert!(!engine.has_critical_alarm());
        assert!(engine.resolve_alarm(&a1.alarm_id).is_ok());
        assert!(engine.get_active_alarms().is_empty());
    }

    #[test]
    fn resolving_already_resolved_fails() {
        let engine = engine_with(SAMPLE);
        let a1 = engine.raise_alarm("W001", "test", None).unwrap();
        engine.resolve_alarm(&a1.alarm_id).unwrap();
        assert!(engine.resolve_alarm(&a1.alarm_id).is_err());
    }

    #[test]
    fn raise_and_resolve_publish_events() {
        use crate::events::test_support::InMemoryEventBus;

        let mut cfg = AlarmConfiguration::new();
        cfg.load_from_str(SAMPLE).unwrap();
        let bus = std::sync::Arc::new(InMemoryEventBus::default());
        let engine = AlarmEngine::new(cfg).with_event_bus(bus.clone());

        let alarm = engine.raise_alarm("W001", "test", None).unwrap();
        engine.resolve_alarm(&alarm.alarm_id).unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].0, "alarm.raised");
        assert_eq!(published[0].1.type_name, "AlarmRaised");
        assert_eq!(published[1].0, "alarm.cleared");
        assert_eq!(published[1].1.type_name, "AlarmCleared");
    }
}
