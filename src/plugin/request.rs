//! Plugin wire format and method table.
//!
//! Requests name a driver method and carry its arguments positionally:
//!
//! ```json
//! { "methodName": "createNetwork", "parameters": [ {vimInstance}, {network} ] }
//! ```
//!
//! Each table entry checks the arity and decodes every argument into its
//! declared type before the driver is called. Replies carry either the
//! serialized return value or the error:
//!
//! ```json
//! { "answer": ... }
//! { "exception": { "detailMessage": "..." } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::ExceptionDetail;

use super::driver::{Driver, LaunchRequest};

// ============================================================================
// PluginRequest
// ============================================================================

/// A driver call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRequest {
    /// Driver method, e.g. `listServer`.
    pub method_name: String,
    /// Positional arguments.
    #[serde(default)]
    pub parameters: Vec<Value>,
}

// ============================================================================
// PluginResponse
// ============================================================================

/// Result of a driver call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginResponse {
    /// Serialized return value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,
    /// Failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionDetail>,
}

impl PluginResponse {
    /// Successful reply.
    #[inline]
    #[must_use]
    pub fn answer(value: Value) -> Self {
        Self {
            answer: Some(value),
            exception: None,
        }
    }

    /// Failed reply.
    #[inline]
    #[must_use]
    pub fn exception(message: impl Into<String>) -> Self {
        Self {
            answer: None,
            exception: Some(ExceptionDetail::new(message)),
        }
    }

    /// Returns `true` for a failed reply.
    #[inline]
    #[must_use]
    pub fn is_exception(&self) -> bool {
        self.exception.is_some()
    }
}

// ============================================================================
// Serving
// ============================================================================

/// Decodes a request body, calls the driver and builds the reply.
pub(crate) async fn serve(driver: &dyn Driver, body: &[u8]) -> PluginResponse {
    let request: PluginRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Malformed plugin request");
            return PluginResponse::exception(Error::malformed(e.to_string()).to_string());
        }
    };

    let method = request.method_name.clone();
    match dispatch(driver, request).await {
        Ok(answer) => {
            debug!(method = %method, "Driver call succeeded");
            PluginResponse::answer(answer)
        }
        Err(e) => {
            warn!(method = %method, error = %e, "Driver call failed");
            PluginResponse::exception(e.to_string())
        }
    }
}

/// Routes a request to its driver method.
///
/// # Errors
///
/// - [`Error::Protocol`] for an unknown method
/// - [`Error::MalformedMessage`] if the arguments do not match the method
/// - whatever the driver returns
pub(crate) async fn dispatch(driver: &dyn Driver, request: PluginRequest) -> Result<Value> {
    let PluginRequest {
        method_name,
        parameters,
    } = request;
    let mut params = Params::new(&method_name, parameters);

    match method_name.as_str() {
        "addFlavor" => {
            params.expect(2)?;
            answer(driver.add_flavor(params.next("vimInstance")?, params.next("flavor")?).await?)
        }
        "addImage" => {
            params.expect(3)?;
            let vim = params.next("vimInstance")?;
            let image = params.next("image")?;
            let file: ImageFile = params.next("imageFile")?;
            answer(driver.add_image(vim, image, file.into_bytes()?).await?)
        }
        "createNetwork" => {
            params.expect(2)?;
            answer(driver.create_network(params.next("vimInstance")?, params.next("network")?).await?)
        }
        "createSubnet" => {
            params.expect(3)?;
            answer(
                driver
                    .create_subnet(
                        params.next("vimInstance")?,
                        params.next("createdNetwork")?,
                        params.next("subnet")?,
                    )
                    .await?,
            )
        }
        "deleteFlavor" => {
            params.expect(2)?;
            answer(driver.delete_flavor(params.next("vimInstance")?, params.next("extId")?).await?)
        }
        "deleteImage" => {
            params.expect(2)?;
            answer(driver.delete_image(params.next("vimInstance")?, params.next("image")?).await?)
        }
        "deleteNetwork" => {
            params.expect(2)?;
            answer(driver.delete_network(params.next("vimInstance")?, params.next("extId")?).await?)
        }
        "deleteSubnet" => {
            params.expect(2)?;
            answer(driver.delete_subnet(params.next("vimInstance")?, params.next("extId")?).await?)
        }
        "deleteServerByIdAndWait" => {
            params.expect(2)?;
            answer(
                driver
                    .delete_server_by_id_and_wait(params.next("vimInstance")?, params.next("id")?)
                    .await?,
            )
        }
        "getNetworkById" => {
            params.expect(2)?;
            answer(driver.get_network_by_id(params.next("vimInstance")?, params.next("id")?).await?)
        }
        "getQuota" => {
            params.expect(1)?;
            answer(driver.get_quota(params.next("vimInstance")?).await?)
        }
        "getType" => {
            params.expect(1)?;
            answer(driver.get_type(params.next("vimInstance")?).await?)
        }
        "launchInstance" => {
            params.expect(8)?;
            let vim = params.next("vimInstance")?;
            let launch = params.launch()?;
            answer(driver.launch_instance(vim, launch).await?)
        }
        "launchInstanceAndWait" => {
            params.expect(10)?;
            let vim = params.next("vimInstance")?;
            let launch = params.launch()?;
            let floating_ips = params.next("floatingIp")?;
            let keys = params.next("keys")?;
            answer(driver.launch_instance_and_wait(vim, launch, floating_ips, keys).await?)
        }
        "listFlavors" => {
            params.expect(1)?;
            answer(driver.list_flavors(params.next("vimInstance")?).await?)
        }
        "listImages" => {
            params.expect(1)?;
            answer(driver.list_images(params.next("vimInstance")?).await?)
        }
        "listNetworks" => {
            params.expect(1)?;
            answer(driver.list_networks(params.next("vimInstance")?).await?)
        }
        "listServer" => {
            params.expect(1)?;
            answer(driver.list_server(params.next("vimInstance")?).await?)
        }
        "updateNetwork" => {
            params.expect(2)?;
            answer(driver.update_network(params.next("vimInstance")?, params.next("network")?).await?)
        }
        other => Err(Error::protocol(format!("Unknown driver method '{other}'"))),
    }
}

#[inline]
fn answer<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

// ============================================================================
// Params
// ============================================================================

/// Positional argument reader.
struct Params<'a> {
    method: &'a str,
    values: std::vec::IntoIter<Value>,
    position: usize,
}

impl<'a> Params<'a> {
    fn new(method: &'a str, values: Vec<Value>) -> Self {
        Self {
            method,
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Checks the argument count.
    fn expect(&self, count: usize) -> Result<()> {
        let given = self.values.len();
        if given == count {
            Ok(())
        } else {
            Err(Error::malformed(format!(
                "{} takes {count} parameters, got {given}",
                self.method
            )))
        }
    }

    /// Decodes the next argument.
    fn next<T: DeserializeOwned>(&mut self, name: &str) -> Result<T> {
        self.position += 1;
        let position = self.position;
        let value = self.values.next().ok_or_else(|| {
            Error::malformed(format!("{}: missing parameter {position} ({name})", self.method))
        })?;

        serde_json::from_value(value).map_err(|e| {
            Error::malformed(format!(
                "{}: parameter {position} ({name}): {e}",
                self.method
            ))
        })
    }

    /// Decodes the seven launch arguments following the VIM instance.
    fn launch(&mut self) -> Result<LaunchRequest> {
        Ok(LaunchRequest {
            name: self.next("name")?,
            image: self.next("image")?,
            flavour: self.next("flavor")?,
            key_pair: self.next("keypair")?,
            networks: self.next("networks")?,
            security_groups: self.next("securityGroups")?,
            user_data: self.next("userData")?,
        })
    }
}

// ============================================================================
// ImageFile
// ============================================================================

/// Image bytes, either base64 or a plain byte array.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImageFile {
    Base64(String),
    Bytes(Vec<u8>),
}

impl ImageFile {
    fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Base64(text) => STANDARD
                .decode(text.as_bytes())
                .map_err(|e| Error::malformed(format!("addImage: imageFile: {e}"))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::catalogue::{
        DeploymentFlavour, Key, Network, NfvImage, Quota, Server, Subnet, VimInstance,
    };

    /// Records calls; answers with canned values.
    #[derive(Default)]
    struct RecordingDriver {
        calls: Mutex<Vec<String>>,
        launches: Mutex<Vec<LaunchRequest>>,
        images: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingDriver {
        fn record(&self, call: &str) {
            self.calls.lock().push(call.to_string());
        }
    }

    fn network(name: &str) -> Network {
        Network {
            name: Some(name.to_string()),
            ..Network::default()
        }
    }

    #[async_trait]
    impl Driver for RecordingDriver {
        async fn add_flavor(&self, _vim: VimInstance, flavour: DeploymentFlavour) -> Result<DeploymentFlavour> {
            self.record("addFlavor");
            Ok(flavour)
        }
        async fn add_image(&self, _vim: VimInstance, image: NfvImage, image_file: Vec<u8>) -> Result<NfvImage> {
            self.record("addImage");
            self.images.lock().push(image_file);
            Ok(image)
        }
        async fn create_network(&self, _vim: VimInstance, network: Network) -> Result<Network> {
            self.record("createNetwork");
            Ok(network)
        }
        async fn create_subnet(&self, _vim: VimInstance, _network: Network, subnet: Subnet) -> Result<Subnet> {
            self.record("createSubnet");
            Ok(subnet)
        }
        async fn delete_flavor(&self, _vim: VimInstance, _ext_id: String) -> Result<bool> {
            Ok(true)
        }
        async fn delete_image(&self, _vim: VimInstance, _image: NfvImage) -> Result<bool> {
            Ok(true)
        }
        async fn delete_network(&self, _vim: VimInstance, ext_id: String) -> Result<bool> {
            Ok(ext_id == "net-1")
        }
        async fn delete_subnet(&self, _vim: VimInstance, _ext_id: String) -> Result<bool> {
            Ok(true)
        }
        async fn delete_server_by_id_and_wait(&self, _vim: VimInstance, id: String) -> Result<()> {
            if id == "missing" {
                return Err(Error::handler("server missing not found"));
            }
            Ok(())
        }
        async fn get_network_by_id(&self, _vim: VimInstance, id: String) -> Result<Network> {
            Ok(network(&id))
        }
        async fn get_quota(&self, _vim: VimInstance) -> Result<Quota> {
            Ok(Quota {
                cores: 8,
                ..Quota::default()
            })
        }
        async fn get_type(&self, vim: VimInstance) -> Result<String> {
            Ok(vim.vim_type.unwrap_or_default())
        }
        async fn launch_instance(&self, _vim: VimInstance, request: LaunchRequest) -> Result<Server> {
            let name = request.name.clone();
            self.launches.lock().push(request);
            Ok(Server {
                name: Some(name),
                ..Server::default()
            })
        }
        async fn launch_instance_and_wait(
            &self,
            _vim: VimInstance,
            request: LaunchRequest,
            floating_ips: BTreeMap<String, String>,
            keys: Vec<Key>,
        ) -> Result<Server> {
            self.record(&format!("launchInstanceAndWait:{}:{}", floating_ips.len(), keys.len()));
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
            Ok(vec![network("private"), network("public")])
        }
        async fn list_server(&self, _vim: VimInstance) -> Result<Vec<Server>> {
            Ok(Vec::new())
        }
        async fn update_network(&self, _vim: VimInstance, network: Network) -> Result<Network> {
            Ok(network)
        }
    }

    fn vim() -> Value {
        json!({"name": "vim-1", "type": "test", "authUrl": "http://vim:5000/v2.0"})
    }

    fn request(method: &str, parameters: Vec<Value>) -> PluginRequest {
        PluginRequest {
            method_name: method.to_string(),
            parameters,
        }
    }

    #[tokio::test]
    async fn test_list_networks() {
        let driver = RecordingDriver::default();
        let answer = dispatch(&driver, request("listNetworks", vec![vim()]))
            .await
            .expect("answer");
        assert_eq!(answer[0]["name"], "private");
        assert_eq!(answer[1]["name"], "public");
    }

    #[tokio::test]
    async fn test_get_type_reads_vim_instance() {
        let driver = RecordingDriver::default();
        let answer = dispatch(&driver, request("getType", vec![vim()])).await.expect("answer");
        assert_eq!(answer, json!("test"));
    }

    #[tokio::test]
    async fn test_launch_instance_positional_arguments() {
        let driver = RecordingDriver::default();
        let parameters = vec![
            vim(),
            json!("server-1"),
            json!("ubuntu-16.04"),
            json!("m1.small"),
            json!("ops"),
            json!(["private"]),
            json!(["default"]),
            json!("#!/bin/bash"),
        ];
        let answer = dispatch(&driver, request("launchInstance", parameters))
            .await
            .expect("answer");
        assert_eq!(answer["name"], "server-1");

        let launches = driver.launches.lock();
        assert_eq!(launches[0].flavour, "m1.small");
        assert_eq!(launches[0].networks, vec!["private".to_string()]);
        assert_eq!(launches[0].user_data, "#!/bin/bash");
    }

    #[tokio::test]
    async fn test_launch_instance_and_wait_with_keys() {
        let driver = RecordingDriver::default();
        let parameters = vec![
            vim(),
            json!("server-1"),
            json!("ubuntu"),
            json!("m1.small"),
            json!("ops"),
            json!(["private"]),
            json!(["default"]),
            json!(""),
            json!({"private": "random"}),
            json!([{"name": "ops", "publicKey": "ssh-rsa AAAA"}]),
        ];
        let answer = dispatch(&driver, request("launchInstanceAndWait", parameters))
            .await
            .expect("answer");
        assert_eq!(answer["status"], "ACTIVE");
        assert_eq!(driver.calls.lock()[0], "launchInstanceAndWait:1:1");
    }

    #[tokio::test]
    async fn test_add_image_accepts_both_encodings() {
        let driver = RecordingDriver::default();
        dispatch(&driver, request("addImage", vec![vim(), json!({"name": "img"}), json!("AQID")]))
            .await
            .expect("base64");
        dispatch(&driver, request("addImage", vec![vim(), json!({"name": "img"}), json!([1, 2, 3])]))
            .await
            .expect("bytes");

        let images = driver.images.lock();
        assert_eq!(images[0], vec![1, 2, 3]);
        assert_eq!(images[1], vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unit_answer_is_null() {
        let driver = RecordingDriver::default();
        let answer = dispatch(&driver, request("deleteServerByIdAndWait", vec![vim(), json!("srv-1")]))
            .await
            .expect("answer");
        assert_eq!(answer, Value::Null);
    }

    #[tokio::test]
    async fn test_wrong_arity_is_malformed() {
        let driver = RecordingDriver::default();
        let err = dispatch(&driver, request("createNetwork", vec![vim()])).await.unwrap_err();
        assert!(matches!(err, Error::MalformedMessage { .. }));
        assert!(driver.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_type_is_malformed() {
        let driver = RecordingDriver::default();
        let err = dispatch(&driver, request("deleteNetwork", vec![vim(), json!(42)]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("extId"));
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let driver = RecordingDriver::default();
        let err = dispatch(&driver, request("rebootEverything", Vec::new())).await.unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[tokio::test]
    async fn test_serve_wraps_driver_error() {
        let driver = RecordingDriver::default();
        let body = serde_json::to_vec(&request("deleteServerByIdAndWait", vec![vim(), json!("missing")]))
            .expect("body");
        let response = serve(&driver, &body).await;

        assert!(response.is_exception());
        let wire = serde_json::to_value(&response).expect("json");
        assert!(wire["exception"]["detailMessage"].as_str().expect("message").contains("not found"));
        assert!(wire.get("answer").is_none());
    }

    #[tokio::test]
    async fn test_serve_rejects_garbage() {
        let driver = RecordingDriver::default();
        let response = serve(&driver, b"not json").await;
        assert!(response.is_exception());
    }
}
