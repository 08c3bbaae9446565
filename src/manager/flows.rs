//! Lifecycle flows: one inbound orchestrator message in, at most one reply out.
//!
//! # Routing
//!
//! | Action | Handler call | Reply |
//! |--------|--------------|-------|
//! | `INSTANTIATE` | grant, optional allocate, `instantiate` | `INSTANTIATE` |
//! | `SCALE_OUT` | optional `SCALING` round trip, `scale` | `SCALED` |
//! | `SCALE_IN` | `scale` | none |
//! | `START` / `STOP` | `start`/`stop` or the instance variant | `START` / `STOP` |
//! | `HEAL` | `heal` | `HEAL` |
//! | `CONFIGURE` | `configure` | `CONFIGURE` |
//! | `MODIFY` | `modify` | `MODIFY` |
//! | `RELEASE_RESOURCES` | `terminate` | `RELEASE_RESOURCES` |
//! | `RESUME` | `action_for_resume`, `resume` | the chosen action |
//! | `UPDATE` | `update_software` | `UPDATE` |
//! | `ERROR` | `handle_error` | none |
//! | `SCALING`, `*_FINISH` | none | none |
//!
//! Any failure ends the flow with a single `ERROR` report carrying the record
//! known at that point and its network service ID.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::catalogue::{STATE_STANDBY, VirtualNetworkFunctionRecord};
use crate::config::DispatcherConfig;
use crate::error::{Error, Result};
use crate::protocol::{
    Action, Message, OrError, OrGeneric, OrHeal, OrInstantiate, OrScaling, OrStartStop, OrUpdate,
    Payload, SenderType, decode, encode,
};
use crate::transport::Channel;

use super::handler::{Handler, Scripts};

// ============================================================================
// Constants
// ============================================================================

/// Scaling mode that parks the new instance instead of starting it.
const MODE_STANDBY: &str = "standby";

// ============================================================================
// Failure
// ============================================================================

/// A flow failure together with the record to report it against.
#[derive(Debug)]
pub(crate) struct Failure {
    pub(crate) vnfr: VirtualNetworkFunctionRecord,
    pub(crate) error: Error,
}

/// Outcome of a flow: an optional reply, or a failure to report.
pub(crate) type FlowResult = std::result::Result<Option<Message>, Failure>;

/// Attaches a record to an error.
trait AgainstRecord<T> {
    fn against(self, vnfr: &VirtualNetworkFunctionRecord) -> std::result::Result<T, Failure>;
}

impl<T> AgainstRecord<T> for Result<T> {
    #[inline]
    fn against(self, vnfr: &VirtualNetworkFunctionRecord) -> std::result::Result<T, Failure> {
        self.map_err(|error| Failure {
            vnfr: vnfr.clone(),
            error,
        })
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// State shared by the dispatcher workers.
pub(crate) struct Lifecycle {
    channel: Arc<Channel>,
    handler: Arc<dyn Handler>,
    config: DispatcherConfig,
}

impl Lifecycle {
    pub(crate) fn new(channel: Arc<Channel>, handler: Arc<dyn Handler>, config: DispatcherConfig) -> Self {
        Self {
            channel,
            handler,
            config,
        }
    }

    /// Handles one inbound message end to end.
    pub(crate) async fn handle(&self, message: Message) {
        let action = message.action();

        match self.route(message).await {
            Ok(Some(reply)) => {
                let reply_action = reply.action();
                match self.reply(reply).await {
                    Ok(()) => info!(action = %action, reply = %reply_action, "Lifecycle operation completed"),
                    Err(e) => error!(action = %action, error = %e, "Failed to publish reply"),
                }
            }
            Ok(None) => debug!(action = %action, "Lifecycle operation completed without reply"),
            Err(failure) => self.report_error(&action, failure).await,
        }
    }

    /// Dispatches on the action; every arm destructures the payload the
    /// decoding table guarantees for it.
    async fn route(&self, message: Message) -> FlowResult {
        let action = message.action();
        let payload = message.into_payload();

        match action {
            Action::Instantiate => match payload {
                Payload::OrInstantiate(body) => self.instantiate(body).await,
                other => dispatch_mismatch(&action, &other),
            },
            Action::ScaleOut => match payload {
                Payload::OrScaling(body) => self.scale_out(body).await,
                other => dispatch_mismatch(&action, &other),
            },
            Action::ScaleIn => match payload {
                Payload::OrScaling(body) => self.scale_in(body).await,
                other => dispatch_mismatch(&action, &other),
            },
            Action::Start | Action::Stop => match payload {
                Payload::OrStartStop(body) => self.start_stop(body).await,
                other => dispatch_mismatch(&action, &other),
            },
            Action::Heal => match payload {
                Payload::OrHeal(body) => self.heal(body).await,
                other => dispatch_mismatch(&action, &other),
            },
            Action::Update => match payload {
                Payload::OrUpdate(body) => self.update(body).await,
                other => dispatch_mismatch(&action, &other),
            },
            Action::Error => match payload {
                Payload::OrError(body) => self.orchestrator_error(body).await,
                other => dispatch_mismatch(&action, &other),
            },
            Action::Configure
            | Action::Modify
            | Action::ReleaseResources
            | Action::Resume => match payload {
                Payload::OrGeneric(body) => self.generic(body).await,
                other => dispatch_mismatch(&action, &other),
            },
            Action::Scaling => {
                debug!("SCALING is not handled, ignored");
                Ok(None)
            }
            Action::InstantiateFinish | Action::ReleaseResourcesFinish => {
                debug!(action = %action, "Nothing to do");
                Ok(None)
            }
            other => {
                warn!(action = %other, "Unhandled action, dropped");
                Ok(None)
            }
        }
    }
}

// ============================================================================
// Lifecycle - Instantiate
// ============================================================================

impl Lifecycle {
    /// Grant, optional allocation, then the handler's `instantiate`.
    async fn instantiate(&self, body: OrInstantiate) -> FlowResult {
        let mut vnfr = VirtualNetworkFunctionRecord::from_descriptor(
            &body.vnfd,
            body.flavour_key(),
            &body.vlrs,
            &body.extension,
            &body.vim_instances,
        );
        if let Some(name) = &body.vnf_instance_name {
            vnfr.name = Some(name.clone());
        }

        self.handler.check_instantiation_feasibility().await.against(&vnfr)?;

        let reply = self.round_trip(Message::grant_request(vnfr.clone())).await.against(&vnfr)?;
        let grant = match reply.into_payload() {
            Payload::OrGrant(grant) if grant.grant_allowed => grant,
            Payload::OrGrant(grant) => {
                let reported = if grant.vnfr.id.is_some() { grant.vnfr } else { vnfr };
                return Err(Failure {
                    vnfr: reported,
                    error: Error::orchestrator("grant operation refused"),
                });
            }
            Payload::OrError(refusal) => return Err(orchestrator_failure(refusal, vnfr)),
            other => {
                return Err(Failure {
                    vnfr,
                    error: Error::unexpected_payload(other.action(), "OrGrant"),
                });
            }
        };

        vnfr = grant.vnfr;
        info!(vdus = grant.vdu_vim.len(), "Grant received");

        if self.config.allocate {
            let user_data = self.handler.user_data().await;
            let request = Message::allocate_resources(vnfr.clone(), grant.vdu_vim, user_data, body.keys);
            let reply = self.round_trip(request).await.against(&vnfr)?;
            vnfr = match reply.into_payload() {
                Payload::OrGeneric(allocated) if allocated.action == Action::AllocateResources => allocated.vnfr,
                Payload::OrError(refusal) => return Err(orchestrator_failure(refusal, vnfr)),
                other => {
                    return Err(Failure {
                        vnfr,
                        error: Error::unexpected_payload(other.action(), "OrGeneric"),
                    });
                }
            };
            info!("Resources allocated");
        }

        let scripts = Scripts::from_package(body.vnf_package.as_ref());
        let vnfr = self
            .handler
            .instantiate(vnfr.clone(), scripts, &body.vim_instances)
            .await
            .against(&vnfr)?;

        Ok(Some(Message::instantiated(vnfr)))
    }
}

// ============================================================================
// Lifecycle - Scaling
// ============================================================================

impl Lifecycle {
    /// Optional `SCALING` round trip, standby marking, then `scale`.
    async fn scale_out(&self, body: OrScaling) -> FlowResult {
        let OrScaling {
            component,
            vnfc_instance,
            vnf_package,
            mut vnfr,
            mode,
            ..
        } = body;

        if self.config.allocate {
            let user_data = self.handler.user_data().await;
            let reply = self
                .round_trip(Message::scaling_request(vnfr.clone(), user_data))
                .await
                .against(&vnfr)?;

            vnfr = match reply.into_payload() {
                Payload::OrGeneric(scaled) => scaled.vnfr,
                Payload::OrError(refusal) => {
                    warn!("Orchestrator refused scaling");
                    self.handler.handle_error(refusal.vnfr.clone()).await.against(&refusal.vnfr)?;
                    return Ok(None);
                }
                other => {
                    return Err(Failure {
                        vnfr,
                        error: Error::unexpected_payload(other.action(), "OrGeneric"),
                    });
                }
            };
        }

        let component_id = component
            .as_ref()
            .and_then(|component| component.id.clone())
            .or_else(|| vnfc_instance.as_ref().and_then(|i| i.component_id().map(str::to_string)));

        let standby = mode
            .as_deref()
            .is_some_and(|mode| mode.eq_ignore_ascii_case(MODE_STANDBY));

        let located = component_id.as_deref().and_then(|id| vnfr.find_instance_mut(id));
        let instance = match located {
            Some(instance) => {
                if standby {
                    instance.state = Some(STATE_STANDBY.to_string());
                }
                Some(instance.clone())
            }
            None if self.config.allocate => {
                return Err(Failure {
                    vnfr,
                    error: Error::protocol(format!(
                        "no component instance created for component {}",
                        component_id.as_deref().unwrap_or("<none>")
                    )),
                });
            }
            None => vnfc_instance.map(|mut instance| {
                if standby {
                    instance.state = Some(STATE_STANDBY.to_string());
                }
                instance
            }),
        };

        if standby {
            debug!("New component instance parked in standby");
        }

        let scripts = Scripts::from_package(vnf_package.as_ref());
        let vnfr = self
            .handler
            .scale(Action::ScaleOut, vnfr.clone(), instance.clone(), scripts)
            .await
            .against(&vnfr)?;

        Ok(Some(Message::scaled(vnfr, instance)))
    }

    async fn scale_in(&self, body: OrScaling) -> FlowResult {
        let scripts = Scripts::from_package(body.vnf_package.as_ref());
        self.handler
            .scale(Action::ScaleIn, body.vnfr.clone(), body.vnfc_instance, scripts)
            .await
            .against(&body.vnfr)?;
        Ok(None)
    }
}

// ============================================================================
// Lifecycle - Record Operations
// ============================================================================

impl Lifecycle {
    async fn start_stop(&self, body: OrStartStop) -> FlowResult {
        let OrStartStop {
            action,
            vnfr,
            vnfc_instance,
            ..
        } = body;

        let updated = match (&action, vnfc_instance.clone()) {
            (Action::Start, None) => self.handler.start(vnfr.clone()).await,
            (Action::Start, Some(instance)) => self.handler.start_vnfc_instance(vnfr.clone(), instance).await,
            (_, None) => self.handler.stop(vnfr.clone()).await,
            (_, Some(instance)) => self.handler.stop_vnfc_instance(vnfr.clone(), instance).await,
        }
        .against(&vnfr)?;

        Message::start_stop_reply(action, updated, vnfc_instance)
            .map(Some)
            .against(&vnfr)
    }

    async fn heal(&self, body: OrHeal) -> FlowResult {
        let OrHeal {
            vnfr,
            vnfc_instance,
            cause,
        } = body;

        let updated = self
            .handler
            .heal(vnfr.clone(), vnfc_instance.clone(), cause.clone())
            .await
            .against(&vnfr)?;

        Ok(Some(Message::healed(updated, vnfc_instance, cause)))
    }

    async fn update(&self, body: OrUpdate) -> FlowResult {
        let updated = self
            .handler
            .update_software(body.script, body.vnfr.clone())
            .await
            .against(&body.vnfr)?;

        Message::generic_reply(Action::Update, updated)
            .map(Some)
            .against(&body.vnfr)
    }

    async fn generic(&self, body: OrGeneric) -> FlowResult {
        let OrGeneric {
            action,
            vnfr,
            dependency,
        } = body;

        let (reply_action, updated) = match action {
            Action::Configure => (action, self.handler.configure(vnfr.clone()).await),
            Action::Modify => (action, self.handler.modify(vnfr.clone(), dependency).await),
            Action::ReleaseResources => (action, self.handler.terminate(vnfr.clone()).await),
            _ => {
                let replay = self.handler.action_for_resume(&vnfr, None).await.against(&vnfr)?;
                debug!(replay = %replay, "Resuming");
                (replay, self.handler.resume(vnfr.clone(), None, dependency).await)
            }
        };

        let updated = updated.against(&vnfr)?;
        Message::generic_reply(reply_action, updated)
            .map(Some)
            .against(&vnfr)
    }

    async fn orchestrator_error(&self, body: OrError) -> FlowResult {
        let OrError { mut vnfr, nsr_id } = body;
        if vnfr.parent_ns_id.is_none() {
            vnfr.parent_ns_id = nsr_id;
        }

        warn!(vnfr = vnfr.id.as_deref().unwrap_or_default(), "Orchestrator reported an error");
        self.handler.handle_error(vnfr.clone()).await.against(&vnfr)?;
        Ok(None)
    }
}

// ============================================================================
// Lifecycle - I/O
// ============================================================================

impl Lifecycle {
    /// Sends a request to the orchestrator and decodes its reply.
    async fn round_trip(&self, request: Message) -> Result<Message> {
        assert_manager_sender(&request);
        let body = encode(&request)?;
        let reply = self
            .channel
            .exchange(&self.config.actions_queue, body, self.config.exchange_timeout)
            .await?;
        decode(&reply, SenderType::Nfvo)
    }

    /// Publishes a reply to the orchestrator.
    async fn reply(&self, message: Message) -> Result<()> {
        assert_manager_sender(&message);
        let body = encode(&message)?;
        self.channel.send(&self.config.reply_queue, body).await
    }

    /// Reports a failed flow as an `ERROR` message.
    async fn report_error(&self, action: &Action, failure: Failure) {
        let Failure { vnfr, error } = failure;
        error!(action = %action, error = %error, "Lifecycle operation failed");

        let nsr_id = vnfr.nsr_id().to_string();
        let report = Message::error_report(vnfr, nsr_id, error.to_string());

        if let Err(e) = self.reply(report).await {
            error!(action = %action, error = %e, "Failed to report error");
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn orchestrator_failure(refusal: OrError, fallback: VirtualNetworkFunctionRecord) -> Failure {
    let vnfr = if refusal.vnfr.id.is_some() { refusal.vnfr } else { fallback };
    Failure {
        vnfr,
        error: Error::orchestrator("orchestrator replied with ERROR"),
    }
}

/// Only manager messages may leave this side.
fn assert_manager_sender(message: &Message) {
    assert!(
        message.sender() == SenderType::Vnfm,
        "refusing to send a {} message as the manager",
        message.payload().shape()
    );
}

/// The decoding table and the routing table disagree.
fn dispatch_mismatch(action: &Action, payload: &Payload) -> ! {
    panic!("{action} routed with a {} payload", payload.shape())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{OrGrant, VnfmGeneric};

    #[test]
    fn test_against_attaches_record() {
        let vnfr = VirtualNetworkFunctionRecord {
            id: Some("vnfr-1".into()),
            ..VirtualNetworkFunctionRecord::default()
        };
        let failure = Err::<(), _>(Error::handler("boom")).against(&vnfr).unwrap_err();
        assert_eq!(failure.vnfr.id.as_deref(), Some("vnfr-1"));
        assert!(matches!(failure.error, Error::Handler { .. }));
    }

    #[test]
    fn test_orchestrator_failure_prefers_reported_record() {
        let local = VirtualNetworkFunctionRecord::default();
        let reported = VirtualNetworkFunctionRecord {
            id: Some("remote".into()),
            ..VirtualNetworkFunctionRecord::default()
        };
        let failure = orchestrator_failure(
            OrError {
                vnfr: reported,
                nsr_id: None,
            },
            local,
        );
        assert_eq!(failure.vnfr.id.as_deref(), Some("remote"));
    }

    #[test]
    fn test_orchestrator_failure_falls_back_to_local_record() {
        let local = VirtualNetworkFunctionRecord {
            id: Some("local".into()),
            ..VirtualNetworkFunctionRecord::default()
        };
        let failure = orchestrator_failure(
            OrError {
                vnfr: VirtualNetworkFunctionRecord::default(),
                nsr_id: None,
            },
            local,
        );
        assert_eq!(failure.vnfr.id.as_deref(), Some("local"));
    }

    #[test]
    #[should_panic(expected = "refusing to send")]
    fn test_orchestrator_message_is_never_sent() {
        let message = Message::new(
            SenderType::Nfvo,
            Payload::OrGrant(OrGrant {
                grant_allowed: true,
                ..OrGrant::default()
            }),
        )
        .expect("message");
        assert_manager_sender(&message);
    }

    #[test]
    #[should_panic(expected = "routed with")]
    fn test_dispatch_mismatch_panics() {
        let payload = Payload::VnfmGeneric(VnfmGeneric {
            action: Action::Modify,
            vnfr: VirtualNetworkFunctionRecord::default(),
        });
        dispatch_mismatch(&Action::Instantiate, &payload);
    }
}
