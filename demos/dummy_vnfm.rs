//! Dummy VNF manager.
//!
//! Demonstrates:
//! - Implementing a lifecycle handler that only echoes records
//! - Starting a manager on RabbitMQ or on the in-memory broker
//! - Playing the orchestrator side of an instantiation by hand
//!
//! Usage:
//!   cargo run --example dummy_vnfm
//!   cargo run --example dummy_vnfm -- --memory
//!   cargo run --example dummy_vnfm -- --debug
//!   cargo run --example dummy_vnfm -- --host 10.0.0.5

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vnfm_amqp::catalogue::{
    Script, Status, VimInstance, VirtualNetworkFunctionRecord, VnfcInstance, VnfrDependency,
};
use vnfm_amqp::config::{ACTIONS_QUEUE, ACTIONS_REPLY_QUEUE, REGISTER_QUEUE, UNREGISTER_QUEUE};
use vnfm_amqp::protocol::{OrGrant, OrInstantiate};
use vnfm_amqp::transport::Envelope;
use vnfm_amqp::{
    Action, BrokerConfig, Error, Handler, Manager, ManagerConfig, MemoryBroker, Message, Payload,
    Result, Scripts, SenderType, decode, encode,
};

// ============================================================================
// Arguments
// ============================================================================

#[derive(Debug, Clone)]
struct Args {
    debug: bool,
    memory: bool,
    host: String,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = std::env::args().collect();
        let host = args
            .iter()
            .position(|a| a == "--host")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_else(|| "localhost".to_string());

        Self {
            debug: args.iter().any(|a| a == "--debug"),
            memory: args.iter().any(|a| a == "--memory"),
            host,
        }
    }
}

fn init_logging(debug: bool) {
    let filter = if debug { "vnfm_amqp=debug,dummy_vnfm=debug" } else { "vnfm_amqp=info,dummy_vnfm=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

// ============================================================================
// Handler
// ============================================================================

/// Accepts every operation and moves the record through its states.
struct DummyHandler;

#[async_trait]
impl Handler for DummyHandler {
    async fn action_for_resume(
        &self,
        _vnfr: &VirtualNetworkFunctionRecord,
        _vnfc_instance: Option<&VnfcInstance>,
    ) -> Result<Action> {
        Ok(Action::Configure)
    }

    async fn check_instantiation_feasibility(&self) -> Result<()> {
        Ok(())
    }

    async fn configure(&self, vnfr: VirtualNetworkFunctionRecord) -> Result<VirtualNetworkFunctionRecord> {
        Ok(vnfr)
    }

    async fn handle_error(&self, mut vnfr: VirtualNetworkFunctionRecord) -> Result<VirtualNetworkFunctionRecord> {
        vnfr.status = Status::Error;
        Ok(vnfr)
    }

    async fn heal(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        _vnfc_instance: Option<VnfcInstance>,
        _cause: Option<String>,
    ) -> Result<VirtualNetworkFunctionRecord> {
        Ok(vnfr)
    }

    async fn instantiate(
        &self,
        mut vnfr: VirtualNetworkFunctionRecord,
        scripts: Scripts,
        vim_instances: &BTreeMap<String, Vec<VimInstance>>,
    ) -> Result<VirtualNetworkFunctionRecord> {
        info!(
            name = vnfr.name.as_deref().unwrap_or_default(),
            vdus = vim_instances.len(),
            scripts = !scripts.is_none(),
            "Instantiating"
        );
        vnfr.status = Status::Inactive;
        Ok(vnfr)
    }

    async fn modify(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        _dependency: Option<VnfrDependency>,
    ) -> Result<VirtualNetworkFunctionRecord> {
        Ok(vnfr)
    }

    async fn resume(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        _vnfc_instance: Option<VnfcInstance>,
        _dependency: Option<VnfrDependency>,
    ) -> Result<VirtualNetworkFunctionRecord> {
        Ok(vnfr)
    }

    async fn scale(
        &self,
        _action: Action,
        vnfr: VirtualNetworkFunctionRecord,
        _vnfc_instance: Option<VnfcInstance>,
        _scripts: Scripts,
    ) -> Result<VirtualNetworkFunctionRecord> {
        Ok(vnfr)
    }

    async fn start(&self, mut vnfr: VirtualNetworkFunctionRecord) -> Result<VirtualNetworkFunctionRecord> {
        vnfr.status = Status::Active;
        Ok(vnfr)
    }

    async fn start_vnfc_instance(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        _vnfc_instance: VnfcInstance,
    ) -> Result<VirtualNetworkFunctionRecord> {
        Ok(vnfr)
    }

    async fn stop(&self, mut vnfr: VirtualNetworkFunctionRecord) -> Result<VirtualNetworkFunctionRecord> {
        vnfr.status = Status::Inactive;
        Ok(vnfr)
    }

    async fn stop_vnfc_instance(
        &self,
        vnfr: VirtualNetworkFunctionRecord,
        _vnfc_instance: VnfcInstance,
    ) -> Result<VirtualNetworkFunctionRecord> {
        Ok(vnfr)
    }

    async fn terminate(&self, mut vnfr: VirtualNetworkFunctionRecord) -> Result<VirtualNetworkFunctionRecord> {
        vnfr.status = Status::Terminated;
        Ok(vnfr)
    }

    async fn update_software(
        &self,
        _script: Option<Script>,
        vnfr: VirtualNetworkFunctionRecord,
    ) -> Result<VirtualNetworkFunctionRecord> {
        Ok(vnfr)
    }

    async fn user_data(&self) -> String {
        String::new()
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Dummy VNFM ===\n");

    let config = ManagerConfig::new("dummy")
        .with_description("dummy VNF manager")
        .with_broker(BrokerConfig::default().with_host(args.host.clone()));

    if args.memory {
        return run_in_memory(config).await;
    }

    let manager = Manager::builder()
        .config(config)
        .handler(Arc::new(DummyHandler))
        .start()
        .await?;

    println!("[Manager] Registered on {}:5672, press Ctrl+C to stop", args.host);
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| Error::connection(e.to_string()))?;

    manager.stop().await?;
    println!("[Manager] Unregistered");
    Ok(())
}

/// Runs one instantiation against the in-memory broker.
async fn run_in_memory(config: ManagerConfig) -> Result<()> {
    let broker = MemoryBroker::with_queues(&[REGISTER_QUEUE, UNREGISTER_QUEUE, ACTIONS_QUEUE, ACTIONS_REPLY_QUEUE]);

    let manager = Manager::builder()
        .config(config)
        .handler(Arc::new(DummyHandler))
        .connector(Arc::new(broker.clone()))
        .start()
        .await?;
    println!("[Manager] Registered on the in-memory broker");

    // ========================================================================
    // Orchestrator: instantiate
    // ========================================================================

    let vnfd = serde_json::from_value(json!({
        "id": "vnfd-1",
        "name": "iperf-server",
        "type": "server",
        "endpoint": "dummy",
        "vdu": [{"id": "vdu-1", "name": "server"}]
    }))?;
    let request = Message::new(
        SenderType::Nfvo,
        Payload::OrInstantiate(OrInstantiate {
            vnfd,
            ..OrInstantiate::default()
        }),
    )?;
    broker.publish(manager.endpoint().endpoint.as_str(), Envelope::new(encode(&request)?));
    println!("[NFVO] INSTANTIATE sent");

    // ========================================================================
    // Orchestrator: grant
    // ========================================================================

    let grant_request = next(&broker, ACTIONS_QUEUE).await?;
    let message = decode(&grant_request.data, SenderType::Vnfm)?;
    let Payload::VnfmGrant(grant) = message.into_payload() else {
        return Err(Error::protocol("expected a grant request"));
    };
    println!("[NFVO] GRANT_OPERATION received, allowing");

    let grant_reply = Message::new(
        SenderType::Nfvo,
        Payload::OrGrant(OrGrant {
            grant_allowed: true,
            vdu_vim: BTreeMap::new(),
            vnfr: grant.vnfr,
        }),
    )?;
    let reply_to = grant_request
        .reply_to
        .ok_or_else(|| Error::protocol("grant request without reply queue"))?;
    broker.publish(
        &reply_to,
        Envelope {
            data: encode(&grant_reply)?,
            correlation_id: grant_request.correlation_id,
            reply_to: None,
        },
    );

    // Allocation is enabled by default.
    let allocate = next(&broker, ACTIONS_QUEUE).await?;
    let message = decode(&allocate.data, SenderType::Vnfm)?;
    let Payload::VnfmAllocateResources(body) = message.into_payload() else {
        return Err(Error::protocol("expected an allocation request"));
    };
    println!("[NFVO] ALLOCATE_RESOURCES received");

    let allocated = Message::new(
        SenderType::Nfvo,
        Payload::OrGeneric(vnfm_amqp::protocol::OrGeneric {
            action: Action::AllocateResources,
            vnfr: body.vnfr,
            dependency: None,
        }),
    )?;
    let reply_to = allocate
        .reply_to
        .ok_or_else(|| Error::protocol("allocation request without reply queue"))?;
    broker.publish(
        &reply_to,
        Envelope {
            data: encode(&allocated)?,
            correlation_id: allocate.correlation_id,
            reply_to: None,
        },
    );

    // ========================================================================
    // Orchestrator: result
    // ========================================================================

    let reply = next(&broker, ACTIONS_REPLY_QUEUE).await?;
    let message = decode(&reply.data, SenderType::Vnfm)?;
    println!("[NFVO] {} received", message.action());

    manager.stop().await?;
    println!("[Manager] Unregistered");
    Ok(())
}

async fn next(broker: &MemoryBroker, queue: &str) -> Result<Envelope> {
    tokio::time::timeout(Duration::from_secs(5), broker.next_message(queue))
        .await
        .ok()
        .flatten()
        .ok_or_else(|| Error::protocol(format!("nothing arrived on {queue}")))
}
