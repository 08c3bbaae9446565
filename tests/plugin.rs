//! VIM-driver plugin served over the in-memory broker.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::time::timeout;

use vnfm_amqp::catalogue::{DeploymentFlavour, Key, Network, NfvImage, Quota, Server, Subnet, VimInstance};
use vnfm_amqp::transport::Envelope;
use vnfm_amqp::{
    ChannelConfig, CorrelationId, Driver, Error, LaunchRequest, MemoryBroker, Plugin, PluginConfig,
    PluginRequest, PluginResponse, Result,
};

const QUEUE: &str = "vim-drivers.test.unit";
const CALLER: &str = "caller-replies";
const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// Fixtures
// ============================================================================

/// Driver keeping networks in memory; everything else is canned.
#[derive(Default)]
struct InMemoryDriver {
    networks: Mutex<BTreeMap<String, Network>>,
}

#[async_trait]
impl Driver for InMemoryDriver {
    async fn add_flavor(&self, _vim: VimInstance, flavour: DeploymentFlavour) -> Result<DeploymentFlavour> {
        Ok(flavour)
    }

    async fn add_image(&self, _vim: VimInstance, mut image: NfvImage, image_file: Vec<u8>) -> Result<NfvImage> {
        image.ext_id = Some(format!("img-{}", image_file.len()));
        Ok(image)
    }

    async fn create_network(&self, _vim: VimInstance, mut network: Network) -> Result<Network> {
        let mut networks = self.networks.lock();
        let ext_id = format!("net-{}", networks.len() + 1);
        network.ext_id = Some(ext_id.clone());
        networks.insert(ext_id, network.clone());
        Ok(network)
    }

    async fn create_subnet(&self, _vim: VimInstance, network: Network, mut subnet: Subnet) -> Result<Subnet> {
        subnet.network_id = network.ext_id;
        Ok(subnet)
    }

    async fn delete_flavor(&self, _vim: VimInstance, _ext_id: String) -> Result<bool> {
        Ok(true)
    }

    async fn delete_image(&self, _vim: VimInstance, _image: NfvImage) -> Result<bool> {
        Ok(true)
    }

    async fn delete_network(&self, _vim: VimInstance, ext_id: String) -> Result<bool> {
        Ok(self.networks.lock().remove(&ext_id).is_some())
    }

    async fn delete_subnet(&self, _vim: VimInstance, _ext_id: String) -> Result<bool> {
        Ok(true)
    }

    async fn delete_server_by_id_and_wait(&self, _vim: VimInstance, _id: String) -> Result<()> {
        Ok(())
    }

    async fn get_network_by_id(&self, _vim: VimInstance, id: String) -> Result<Network> {
        self.networks
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::handler(format!("network {id} not found")))
    }

    async fn get_quota(&self, _vim: VimInstance) -> Result<Quota> {
        Ok(Quota {
            cores: 8,
            ..Quota::default()
        })
    }

    async fn get_type(&self, vim: VimInstance) -> Result<String> {
        Ok(vim.vim_type.unwrap_or_else(|| "test".to_string()))
    }

    async fn launch_instance(&self, _vim: VimInstance, request: LaunchRequest) -> Result<Server> {
        Ok(Server {
            name: Some(request.name),
            ..Server::default()
        })
    }

    async fn launch_instance_and_wait(
        &self,
        _vim: VimInstance,
        request: LaunchRequest,
        _floating_ips: BTreeMap<String, String>,
        _keys: Vec<Key>,
    ) -> Result<Server> {
        Ok(Server {
            name: Some(request.name),
            status: Some("ACTIVE".into()),
            ..Server::default()
        })
    }

    async fn list_flavors(&self, _vim: VimInstance) -> Result<Vec<DeploymentFlavour>> {
        Ok(Vec::new())
    }

    async fn list_images(&self, _vim: VimInstance) -> Result<Vec<NfvImage>> {
        Ok(Vec::new())
    }

    async fn list_networks(&self, _vim: VimInstance) -> Result<Vec<Network>> {
        Ok(self.networks.lock().values().cloned().collect())
    }

    async fn list_server(&self, _vim: VimInstance) -> Result<Vec<Server>> {
        Ok(Vec::new())
    }

    async fn update_network(&self, _vim: VimInstance, network: Network) -> Result<Network> {
        Ok(network)
    }
}

async fn start(broker: &MemoryBroker) -> Plugin {
    broker.declare_queue(CALLER);
    let config = PluginConfig::new("test", "unit")
        .with_workers(2)
        .with_channel(ChannelConfig::default().with_close_timeout(WAIT));

    Plugin::start_with(config, Arc::new(InMemoryDriver::default()), Arc::new(broker.clone()))
        .await
        .expect("plugin")
}

/// Sends a call and waits for its reply.
async fn call(broker: &MemoryBroker, method: &str, parameters: Vec<Value>) -> PluginResponse {
    serde_json::from_value(call_raw(broker, method, parameters).await).expect("response")
}

/// Sends a call and returns the reply as plain JSON.
async fn call_raw(broker: &MemoryBroker, method: &str, parameters: Vec<Value>) -> Value {
    let request = PluginRequest {
        method_name: method.to_string(),
        parameters,
    };
    let id = CorrelationId::generate();
    let envelope = Envelope::new(serde_json::to_vec(&request).expect("encode"))
        .with_correlation_id(id.clone())
        .with_reply_to(CALLER);
    assert!(broker.publish(QUEUE, envelope));

    let reply = timeout(WAIT, broker.next_message(CALLER))
        .await
        .expect("reply in time")
        .expect("reply");
    assert_eq!(reply.correlation_id, Some(id));
    serde_json::from_slice(&reply.data).expect("json")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_plugin_consumes_its_queue() {
    let broker = MemoryBroker::new();
    let plugin = start(&broker).await;

    assert_eq!(plugin.queue(), QUEUE);
    assert!(broker.has_queue(QUEUE));

    plugin.stop().await.expect("stop");
}

#[tokio::test]
async fn test_network_calls_share_driver_state() -> anyhow::Result<()> {
    let broker = MemoryBroker::new();
    let plugin = start(&broker).await;
    let vim = json!({"name": "vim-1", "type": "test"});

    let created = call(&broker, "createNetwork", vec![vim.clone(), json!({"name": "mgmt"})]).await;
    assert!(!created.is_exception());
    let network: Network = serde_json::from_value(created.answer.context("no answer")?)?;
    let ext_id = network.ext_id.context("no external ID")?;
    assert_eq!(ext_id, "net-1");

    let listed = call(&broker, "listNetworks", vec![vim.clone()]).await;
    let networks: Vec<Network> = serde_json::from_value(listed.answer.context("no answer")?)?;
    assert_eq!(networks.len(), 1);

    let fetched = call(&broker, "getNetworkById", vec![vim.clone(), json!(ext_id)]).await;
    assert_eq!(fetched.answer.context("no answer")?["name"], "mgmt");

    let deleted = call(&broker, "deleteNetwork", vec![vim, json!(ext_id)]).await;
    assert_eq!(deleted.answer, Some(json!(true)));

    plugin.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_unit_answer_is_null() {
    let broker = MemoryBroker::new();
    let plugin = start(&broker).await;

    let reply = call_raw(&broker, "deleteServerByIdAndWait", vec![json!({}), json!("srv-1")]).await;
    assert_eq!(reply, json!({"answer": null}));

    plugin.stop().await.expect("stop");
}

#[tokio::test]
async fn test_failures_become_exceptions() {
    let broker = MemoryBroker::new();
    let plugin = start(&broker).await;

    let missing = call(&broker, "getNetworkById", vec![json!({}), json!("net-404")]).await;
    let detail = missing.exception.expect("exception").detail_message;
    assert!(detail.contains("net-404"));

    let unknown = call(&broker, "rebootEverything", vec![]).await;
    assert!(unknown.is_exception());

    let arity = call(&broker, "getQuota", vec![]).await;
    assert!(arity.is_exception());

    // The workers survive every failure.
    let quota = call(&broker, "getQuota", vec![json!({})]).await;
    assert_eq!(quota.answer.expect("answer")["cores"], 8);

    plugin.stop().await.expect("stop");
}

#[tokio::test]
async fn test_call_without_reply_queue_is_dropped() {
    let broker = MemoryBroker::new();
    let plugin = start(&broker).await;

    let request = PluginRequest {
        method_name: "getType".into(),
        parameters: vec![json!({})],
    };
    assert!(broker.publish(QUEUE, Envelope::new(serde_json::to_vec(&request).expect("encode"))));

    let reply = call(&broker, "getType", vec![json!({"type": "openstack"})]).await;
    assert_eq!(reply.answer, Some(json!("openstack")));
    assert!(broker.try_next_message(CALLER).is_none());

    plugin.stop().await.expect("stop");
}
