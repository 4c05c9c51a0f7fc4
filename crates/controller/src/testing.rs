/// 测试辅助：内存 Compute

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::compute_api::{ComputeError, ComputeOperation};
use common::models::ComputeProtocol;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::compute::ComputeClient;
use crate::config::Config;
use crate::models::compute::ComputeSpec;

/// 记录所有调用的内存 Compute，可按操作名注入失败、响应与延迟
#[derive(Default)]
pub struct FakeCompute {
    calls: Mutex<Vec<ComputeOperation>>,
    failures: Mutex<HashMap<&'static str, ComputeError>>,
    responses: Mutex<HashMap<&'static str, Value>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
}

impl FakeCompute {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_on(&self, op: &'static str, err: ComputeError) {
        self.failures.lock().unwrap().insert(op, err);
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn respond_with(&self, op: &'static str, value: Value) {
        self.responses.lock().unwrap().insert(op, value);
    }

    pub fn delay_on(&self, op: &'static str, delay: Duration) {
        self.delays.lock().unwrap().insert(op, delay);
    }

    pub fn calls(&self) -> Vec<ComputeOperation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.name() == op)
            .count()
    }
}

#[async_trait]
impl ComputeClient for FakeCompute {
    async fn invoke(&self, op: &ComputeOperation, _timeout: Duration) -> Result<Value, ComputeError> {
        self.calls.lock().unwrap().push(op.clone());

        let delay = self.delays.lock().unwrap().get(op.name()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = self.failures.lock().unwrap().get(op.name()).cloned();
        if let Some(err) = failure {
            return Err(err);
        }

        let response = self.responses.lock().unwrap().get(op.name()).cloned();
        if let Some(value) = response {
            return Ok(value);
        }

        Ok(match op {
            ComputeOperation::Version => json!({"version": "2.2.0"}),
            ComputeOperation::CreateNode { body, .. } => body.clone(),
            _ => json!({}),
        })
    }
}

pub fn compute_spec(compute_id: &str, host: &str) -> ComputeSpec {
    ComputeSpec {
        compute_id: compute_id.to_string(),
        name: None,
        host: host.to_string(),
        host_ip: None,
        port: 3080,
        protocol: ComputeProtocol::Http,
        user: None,
        password: None,
    }
}

/// 注册一个内存 Compute
pub async fn add_fake_compute(state: &AppState, compute_id: &str, host: &str) -> Arc<FakeCompute> {
    register_fake(state, compute_spec(compute_id, host)).await
}

/// 按给定参数注册一个内存 Compute
pub async fn register_fake(state: &AppState, spec: ComputeSpec) -> Arc<FakeCompute> {
    let fake = FakeCompute::new();
    state.computes.register(spec, fake.clone()).await.unwrap();
    fake
}

/// 带一个 `local` 内存 Compute 的应用状态
pub async fn test_state() -> (AppState, Arc<FakeCompute>) {
    let config = Config {
        compute_timeout_secs: 5,
        local_compute: false,
        ..Config::default()
    };
    let state = AppState::new(config);
    let fake = add_fake_compute(&state, "local", "127.0.0.1").await;
    (state, fake)
}
