//! Integration tests for bridge-reload against a local VM service.
//!
//! These tests cover:
//! - Connecting over WebSocket and picking up the first isolate
//! - Forcing a reload and reading back the report
//! - Retrying while the VM has no isolate yet

use bridge_reload::{ReloadConfig, ReloadSession, SessionState};
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==============================================================================
// Test Fixture Helpers
// ==============================================================================

#[rpc(server)]
pub trait VmService {
    #[method(name = "getVM")]
    async fn get_vm(&self) -> RpcResult<Value>;

    #[method(name = "reloadSources")]
    async fn reload_sources(
        &self,
        #[argument(rename = "isolateId")] isolate_id: String,
        force: bool,
    ) -> RpcResult<Value>;
}

/// Fake VM that reports its isolate only after `getVM` was called
/// `isolate_after` times.
#[derive(Clone, Default)]
struct FakeVm {
    isolate_after: usize,
    get_vm_calls: Arc<AtomicUsize>,
    reloads: Arc<Mutex<Vec<(String, bool)>>>,
}

#[jsonrpsee::core::async_trait]
impl VmServiceServer for FakeVm {
    async fn get_vm(&self) -> RpcResult<Value> {
        let calls = self.get_vm_calls.fetch_add(1, Ordering::SeqCst);
        let isolates = if calls >= self.isolate_after {
            json!([{ "type": "@Isolate", "id": "isolates/4242", "name": "main" }])
        } else {
            json!([])
        };
        Ok(json!({ "type": "VM", "name": "vm", "isolates": isolates }))
    }

    async fn reload_sources(&self, isolate_id: String, force: bool) -> RpcResult<Value> {
        self.reloads.lock().unwrap().push((isolate_id, force));
        Ok(json!({
            "type": "ReloadReport",
            "success": true,
            "details": { "loadedLibraryCount": 2 }
        }))
    }
}

async fn start_vm(vm: FakeVm) -> (String, ServerHandle) {
    let server = Server::builder()
        .build("127.0.0.1:0")
        .await
        .expect("Failed to build server");
    let addr = server.local_addr().expect("Failed to get server address");
    let handle = server.start(vm.into_rpc());
    (format!("ws://{}", addr), handle)
}

// ==============================================================================
// Session Tests
// ==============================================================================

#[tokio::test]
async fn test_connect_and_reload() {
    let vm = FakeVm::default();
    let (url, handle) = start_vm(vm.clone()).await;

    let mut session = ReloadSession::new(ReloadConfig::default());
    assert!(session.connect(&url, 5, Duration::from_millis(50)).await);
    assert_eq!(session.isolate_id(), Some("isolates/4242"));

    let report = session.reload().await.unwrap();
    assert!(report.success);
    assert_eq!(report.kind, "ReloadReport");
    assert_eq!(session.state(), SessionState::Connected);

    assert_eq!(
        *vm.reloads.lock().unwrap(),
        vec![("isolates/4242".to_string(), true)]
    );

    session.disconnect();
    handle.stop().unwrap();
}

#[tokio::test]
async fn test_waits_for_isolate() {
    let vm = FakeVm {
        isolate_after: 2,
        ..FakeVm::default()
    };
    let (url, handle) = start_vm(vm.clone()).await;

    let config = ReloadConfig {
        endpoint: url,
        max_attempts: 10,
        retry_delay_ms: 20,
    };
    let mut session = ReloadSession::new(config);
    assert!(session.connect_default().await);
    assert_eq!(vm.get_vm_calls.load(Ordering::SeqCst), 3);

    handle.stop().unwrap();
}

#[tokio::test]
async fn test_gives_up_without_isolate() {
    let vm = FakeVm {
        isolate_after: usize::MAX,
        ..FakeVm::default()
    };
    let (url, handle) = start_vm(vm.clone()).await;

    let mut session = ReloadSession::new(ReloadConfig::default());
    assert!(!session.connect(&url, 3, Duration::from_millis(10)).await);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(vm.get_vm_calls.load(Ordering::SeqCst), 3);

    handle.stop().unwrap();
}
