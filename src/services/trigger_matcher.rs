//! Trigger matching: event, schedule, webhook, and blackboard triggers.
//!
//! Schedule and blackboard triggers are sampled from the scheduler tick;
//! event triggers are fed bus events the scheduler drains; webhook triggers
//! are fired by the transport layer through [`TriggerMatcher::fire_webhook`].
//! Every firing starts a workflow execution with the triggering payload in
//! `context.trigger`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Trigger, TriggerConfig};
use crate::domain::ports::{BlackboardStore, TriggerStore};
use crate::services::event_bus::{EventBus, EventPayload, FleetEvent};
use crate::services::workflow_engine::WorkflowEngine;

type HmacSha256 = Hmac<Sha256>;

pub struct TriggerMatcher {
    store: Arc<dyn TriggerStore>,
    blackboard: Arc<dyn BlackboardStore>,
    engine: Arc<WorkflowEngine>,
    bus: Arc<EventBus>,
    /// Per-trigger watermark of the newest blackboard timestamp seen.
    /// In-memory: after a restart only new messages fire.
    watermarks: Mutex<HashMap<Uuid, i64>>,
}

impl TriggerMatcher {
    pub fn new(
        store: Arc<dyn TriggerStore>,
        blackboard: Arc<dyn BlackboardStore>,
        engine: Arc<WorkflowEngine>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            blackboard,
            engine,
            bus,
            watermarks: Mutex::new(HashMap::new()),
        }
    }

    /// Match one bus event against every enabled event trigger.
    pub async fn handle_event(&self, event: &FleetEvent) -> DomainResult<()> {
        let triggers = self.store.list_enabled("event").await?;
        if triggers.is_empty() {
            return Ok(());
        }
        let payload_json = event.payload.to_filter_json();
        for trigger in triggers {
            let TriggerConfig::Event { event_name, filter } = &trigger.config else {
                continue;
            };
            if event_name != event.payload.variant_name() {
                continue;
            }
            if !filter_matches(filter, &payload_json) {
                continue;
            }
            let payload = json!({
                "event": event.payload.variant_name(),
                "data": payload_json.clone(),
            });
            self.fire(&trigger, payload).await?;
        }
        Ok(())
    }

    /// Sample schedule triggers: interval expiry, or cron boundary crossing
    /// when a cron expression is set.
    pub async fn sample_schedules(&self, now: DateTime<Utc>) -> DomainResult<()> {
        let triggers = self.store.list_enabled("schedule").await?;
        for trigger in triggers {
            let TriggerConfig::Schedule { interval_ms, cron } = &trigger.config else {
                continue;
            };
            let due = match (cron, interval_ms) {
                (Some(expression), _) => match cron::Schedule::from_str(expression) {
                    Ok(schedule) => {
                        let reference = trigger.last_fired_at.unwrap_or(trigger.created_at);
                        schedule.after(&reference).next().is_some_and(|next| now >= next)
                    }
                    Err(e) => {
                        warn!(trigger = %trigger.id, error = %e, "invalid cron expression");
                        false
                    }
                },
                (None, Some(interval_ms)) => match trigger.last_fired_at {
                    None => true,
                    Some(last) => {
                        (now - last).num_milliseconds() >= *interval_ms as i64
                    }
                },
                (None, None) => false,
            };
            if due {
                let payload = json!({ "scheduled_at": now.to_rfc3339() });
                self.fire(&trigger, payload).await?;
            }
        }
        Ok(())
    }

    /// Sample blackboard triggers for messages newer than each trigger's
    /// watermark.
    pub async fn sample_blackboard(&self) -> DomainResult<()> {
        let triggers = self.store.list_enabled("blackboard").await?;
        for trigger in triggers {
            let TriggerConfig::Blackboard { swarm_id, message_type, filter } = &trigger.config
            else {
                continue;
            };
            let after_ms = {
                let watermarks = self.watermarks.lock().await;
                watermarks.get(&trigger.id).copied().unwrap_or_else(|| {
                    // First sample only watches forward from now.
                    Utc::now().timestamp_millis()
                })
            };

            let messages = self.blackboard.read_since(swarm_id, after_ms).await?;
            let mut newest = after_ms;
            for message in &messages {
                newest = newest.max(message.created_at_ms);
                if let Some(required) = message_type {
                    if message.message_type != *required {
                        continue;
                    }
                }
                if !filter_matches(filter, &message.payload) {
                    continue;
                }
                let payload = json!({
                    "message_id": message.id,
                    "swarm_id": message.swarm_id.as_str(),
                    "sender": message.sender_handle.as_str(),
                    "message_type": message.message_type.as_str(),
                    "payload": message.payload.clone(),
                });
                self.fire(&trigger, payload).await?;
            }
            self.watermarks.lock().await.insert(trigger.id, newest);
        }
        Ok(())
    }

    /// Fire a webhook trigger from the transport layer. When the trigger
    /// carries a secret, `signature` must be the hex HMAC-SHA256 of the raw
    /// body under that secret.
    pub async fn fire_webhook(
        &self,
        trigger_id: Uuid,
        raw_body: &[u8],
        payload: Value,
        signature: Option<&str>,
    ) -> DomainResult<()> {
        let trigger = self
            .store
            .get_trigger(trigger_id)
            .await?
            .ok_or(DomainError::TriggerNotFound(trigger_id))?;
        if !trigger.is_enabled {
            return Err(DomainError::Validation("trigger is disabled".into()));
        }
        let TriggerConfig::Webhook { secret } = &trigger.config else {
            return Err(DomainError::Validation(format!(
                "trigger {trigger_id} is not a webhook trigger"
            )));
        };
        if let Some(secret) = secret {
            let signature =
                signature.ok_or_else(|| DomainError::Validation("missing signature".into()))?;
            verify_signature(secret, raw_body, signature)?;
        }
        self.fire(&trigger, json!({ "webhook": payload })).await
    }

    /// Start the trigger's workflow with the payload in `context.trigger`
    /// and record the firing.
    async fn fire(&self, trigger: &Trigger, payload: Value) -> DomainResult<()> {
        let fired_at = Utc::now();
        let execution = self
            .engine
            .start_execution(
                trigger.workflow_id,
                serde_json::Map::new(),
                None,
                &format!("trigger:{}", trigger.id),
                Some(payload),
            )
            .await?;
        self.store.record_fire(trigger.id, fired_at).await?;
        self.bus.publish(EventPayload::TriggerFired {
            trigger_id: trigger.id,
            workflow_id: trigger.workflow_id,
            execution_id: execution.id,
        });
        debug!(trigger = %trigger.id, execution = %execution.id, "trigger fired");
        Ok(())
    }
}

/// Every specified key must equal the corresponding payload value.
fn filter_matches(filter: &std::collections::BTreeMap<String, Value>, payload: &Value) -> bool {
    filter
        .iter()
        .all(|(key, expected)| payload.get(key) == Some(expected))
}

/// Constant-time-ish verification of a hex HMAC-SHA256 signature.
fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> DomainResult<()> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DomainError::Internal(format!("hmac init: {e}")))?;
    mac.update(body);
    let expected =
        hex::decode(signature_hex).map_err(|_| DomainError::Validation("bad signature hex".into()))?;
    mac.verify_slice(&expected)
        .map_err(|_| DomainError::Validation("signature mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_requires_every_key_to_match() {
        let mut filter = std::collections::BTreeMap::new();
        filter.insert("handle".to_string(), json!("scout"));
        filter.insert("reason".to_string(), json!("done"));

        let payload = json!({"handle": "scout", "reason": "done", "extra": 1});
        assert!(filter_matches(&filter, &payload));

        let wrong = json!({"handle": "scout", "reason": "crashed"});
        assert!(!filter_matches(&filter, &wrong));

        let missing = json!({"handle": "scout"});
        assert!(!filter_matches(&filter, &missing));
    }

    #[test]
    fn empty_filter_matches_anything() {
        let filter = std::collections::BTreeMap::new();
        assert!(filter_matches(&filter, &json!({"anything": true})));
        assert!(filter_matches(&filter, &Value::Null));
    }

    #[test]
    fn webhook_signatures_verify() {
        let secret = "shhh";
        let body = b"{\"ok\":true}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(verify_signature(secret, body, &signature).is_ok());
        assert!(verify_signature(secret, b"tampered", &signature).is_err());
        assert!(verify_signature(secret, body, "deadbeef").is_err());
        assert!(verify_signature(secret, body, "not-hex").is_err());
    }
}
