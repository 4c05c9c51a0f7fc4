/// 链路管理服务
///
/// 每条链路由两端各一个 UDP 隧道 NIO 组成，端口与对端地址由 Controller 统一计算后
/// 分别下发给两侧的 Compute

use common::compute_api::{CaptureRequest, ComputeOperation, Nio};
use common::models::DataLinkType;
use common::utils::{is_local_only_host, sanitize_file_name};
use common::{Error, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::compute::Compute;
use crate::models::link::{CaptureState, CreateLinkDto, Endpoint, Link, StartCaptureDto, TunnelSide};
use crate::models::node::Node;
use crate::models::project::Project;
use crate::notifications::event;

/// 同一 Compute 上的两端通过回环地址互联
const LOOPBACK: &str = "127.0.0.1";

pub struct LinkService {
    state: AppState,
}

impl LinkService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn list_links(&self, project_id: Uuid) -> Result<Vec<Link>> {
        let project = self.state.projects.get(project_id).await?;
        project.with_state(|st| {
            st.ensure_open(project_id)?;
            let mut links: Vec<Link> = st.links.values().cloned().collect();
            links.sort_by_key(|link| link.link_id);
            Ok(links)
        })
    }

    pub async fn get_link(&self, project_id: Uuid, link_id: Uuid) -> Result<Link> {
        let project = self.state.projects.get(project_id).await?;
        project.with_state(|st| {
            st.ensure_open(project_id)?;
            st.link(link_id).cloned()
        })
    }

    /// 创建链路
    ///
    /// 任一侧 NIO 创建失败时回滚另一侧，链路不会被保存
    pub async fn create_link(&self, project_id: Uuid, dto: CreateLinkDto) -> Result<Link> {
        let endpoints: [Endpoint; 2] = dto
            .nodes
            .as_slice()
            .try_into()
            .map_err(|_| Error::validation(format!("链路需要两个端点，实际 {} 个", dto.nodes.len())))?;
        let [a, b] = endpoints;
        if a.node_id == b.node_id {
            return Err(Error::validation("链路两端不能是同一个节点"));
        }

        let project = self.state.projects.get(project_id).await?;
        let link_id = common::utils::generate_id();

        // 占用端点
        let (node_a, node_b) = project.with_state(|st| -> Result<(Node, Node)> {
            st.ensure_open(project_id)?;
            let node_a = st.writable_node(a.node_id)?.clone();
            let node_b = st.writable_node(b.node_id)?.clone();
            for endpoint in &endpoints {
                if let Some(owner) = st.claimed.get(endpoint) {
                    return Err(Error::conflict(format!(
                        "端点 {}:{}/{} 已被链路 {} 占用",
                        endpoint.node_id, endpoint.adapter_number, endpoint.port_number, owner
                    )));
                }
            }
            for endpoint in endpoints {
                st.claimed.insert(endpoint, link_id);
            }
            Ok((node_a, node_b))
        })?;

        let tunnel = match self.provision(project_id, [(a, &node_a), (b, &node_b)]).await {
            Ok(tunnel) => tunnel,
            Err(e) => {
                project.with_state(|st| st.release_endpoints(link_id, &endpoints));
                return Err(e);
            }
        };

        let link = Link {
            link_id,
            project_id,
            nodes: endpoints,
            capture: CaptureState::Inactive,
            tunnel,
        };
        let committed = project.with_state(|st| {
            let alive = !st.closing
                && endpoints.iter().all(|e| {
                    st.nodes.contains_key(&e.node_id) && !st.deleting.contains(&e.node_id)
                });
            if !alive {
                st.release_endpoints(link_id, &endpoints);
                return false;
            }
            st.links.insert(link_id, link.clone());
            self.state
                .notifications
                .publish(project_id, "link.created", event(&link));
            true
        });

        if !committed {
            warn!("链路 {} 的节点已被删除，回滚", link_id);
            self.teardown_tunnel(project_id, &link.tunnel).await;
            return Err(Error::not_found("链路两端的节点已不存在"));
        }

        info!(
            "🔗 链路已创建: {} ({} <-> {})",
            link_id, node_a.name, node_b.name
        );
        Ok(link)
    }

    /// 计算两端的 UDP 隧道参数并依次创建 NIO
    async fn provision(
        &self,
        project_id: Uuid,
        sides: [(Endpoint, &Node); 2],
    ) -> Result<[TunnelSide; 2]> {
        let [(a, node_a), (b, node_b)] = sides;
        let allocator = &self.state.allocator;

        let port_a = allocator.allocate_udp_port(&node_a.compute_id)?;
        let port_b = match allocator.allocate_udp_port(&node_b.compute_id) {
            Ok(port) => port,
            Err(e) => {
                allocator.release_udp_port(&node_a.compute_id, port_a);
                return Err(e);
            }
        };
        let tunnel = [
            TunnelSide {
                endpoint: a,
                compute_id: node_a.compute_id.clone(),
                node_type: node_a.node_type,
                udp_port: port_a,
            },
            TunnelSide {
                endpoint: b,
                compute_id: node_b.compute_id.clone(),
                node_type: node_b.node_type,
                udp_port: port_b,
            },
        ];

        let (host_a, host_b) = match self.peer_hosts(node_a, node_b).await {
            Ok(hosts) => hosts,
            Err(e) => {
                self.release_ports(&tunnel);
                return Err(e);
            }
        };

        let nio_a = Nio::Udp {
            lport: port_a,
            rhost: host_b,
            rport: port_b,
        };
        let nio_b = Nio::Udp {
            lport: port_b,
            rhost: host_a,
            rport: port_a,
        };

        let op = ComputeOperation::AddNio {
            target: tunnel[0].port_target(project_id),
            nio: nio_a,
        };
        if let Err(e) = self.state.computes.invoke(&tunnel[0].compute_id, op).await {
            self.rollback_failed_side(project_id, &tunnel[0], &e).await;
            self.release_port(&tunnel[1]);
            return Err(e);
        }

        let op = ComputeOperation::AddNio {
            target: tunnel[1].port_target(project_id),
            nio: nio_b,
        };
        if let Err(e) = self.state.computes.invoke(&tunnel[1].compute_id, op).await {
            warn!("第二侧 NIO 创建失败，回滚第一侧: {}", e);
            self.cleanup_side(project_id, &tunnel[0]).await;
            self.rollback_failed_side(project_id, &tunnel[1], &e).await;
            return Err(e);
        }

        Ok(tunnel)
    }

    /// 两侧各自看到的对端地址
    async fn peer_hosts(&self, node_a: &Node, node_b: &Node) -> Result<(String, String)> {
        if node_a.compute_id == node_b.compute_id {
            return Ok((LOOPBACK.to_string(), LOOPBACK.to_string()));
        }
        let compute_a = self.state.computes.get(&node_a.compute_id).await?;
        let compute_b = self.state.computes.get(&node_b.compute_id).await?;
        Ok((tunnel_address(&compute_a)?, tunnel_address(&compute_b)?))
    }

    fn release_ports(&self, tunnel: &[TunnelSide; 2]) {
        for side in tunnel {
            self.release_port(side);
        }
    }

    fn release_port(&self, side: &TunnelSide) {
        self.state
            .allocator
            .release_udp_port(&side.compute_id, side.udp_port);
    }

    /// 删除一侧 NIO，返回该侧端口能否回收
    ///
    /// Compute 明确应答（包括拒绝）时端口可回收；传输失败时 NIO 可能仍在占用端口
    async fn delete_nio(&self, project_id: Uuid, side: &TunnelSide) -> bool {
        let op = ComputeOperation::DeleteNio {
            target: side.port_target(project_id),
        };
        match self.state.computes.invoke(&side.compute_id, op).await {
            Ok(_) => true,
            Err(e) if e.is_transport() => {
                warn!(
                    "删除 NIO 失败，保留 UDP 端口 {}@{}: node={}, {}",
                    side.udp_port, side.compute_id, side.endpoint.node_id, e
                );
                false
            }
            Err(e) => {
                warn!(
                    "删除 NIO 失败（忽略）: node={}, adapter={}, port={}, {}",
                    side.endpoint.node_id, side.endpoint.adapter_number, side.endpoint.port_number, e
                );
                true
            }
        }
    }

    /// 删除一侧 NIO，成功后释放其端口
    async fn cleanup_side(&self, project_id: Uuid, side: &TunnelSide) {
        if self.delete_nio(project_id, side).await {
            self.release_port(side);
        }
    }

    /// 回滚创建失败的一侧；传输失败时 NIO 可能已在 Compute 上创建
    async fn rollback_failed_side(&self, project_id: Uuid, side: &TunnelSide, err: &Error) {
        if err.is_transport() {
            self.cleanup_side(project_id, side).await;
        } else {
            self.release_port(side);
        }
    }

    /// 尽力删除两侧 NIO 并释放可回收的端口
    async fn teardown_tunnel(&self, project_id: Uuid, tunnel: &[TunnelSide; 2]) {
        for side in tunnel {
            self.cleanup_side(project_id, side).await;
        }
    }

    /// 拆除已从项目中移除的链路
    pub(crate) async fn teardown(&self, link: &Link) {
        if let CaptureState::Capturing { endpoint, .. } = &link.capture {
            if let Some(side) = link.side(endpoint) {
                let op = ComputeOperation::StopCapture {
                    target: side.port_target(link.project_id),
                };
                if let Err(e) = self.state.computes.invoke(&side.compute_id, op).await {
                    warn!("停止抓包失败（忽略）: link={}, {}", link.link_id, e);
                }
            }
        }
        self.teardown_tunnel(link.project_id, &link.tunnel).await;
    }

    /// 删除链路；NIO 删除失败只记录日志
    pub async fn delete_link(&self, project_id: Uuid, link_id: Uuid) -> Result<()> {
        let project = self.state.projects.get(project_id).await?;
        let link = project.with_state(|st| {
            st.ensure_open(project_id)?;
            st.links
                .remove(&link_id)
                .ok_or_else(|| Error::not_found(format!("链路不存在: {}", link_id)))
        })?;

        // 拆除完成前端点保持占用
        self.teardown(&link).await;

        project.with_state(|st| {
            st.release_endpoints(link_id, &link.nodes);
            self.state
                .notifications
                .publish(project_id, "link.deleted", event(&link));
        });
        info!("链路已删除: {}", link_id);
        Ok(())
    }

    /// 开始抓包
    pub async fn start_capture(
        &self,
        project_id: Uuid,
        link_id: Uuid,
        dto: StartCaptureDto,
    ) -> Result<Link> {
        let data_link_type = match &dto.data_link_type {
            Some(name) => name.parse::<DataLinkType>().map_err(Error::validation)?,
            None => DataLinkType::default(),
        };
        if let Some(name) = &dto.capture_file_name {
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(Error::validation(format!("无效的抓包文件名: {}", name)));
            }
        }

        let project = self.state.projects.get(project_id).await?;
        let (link, default_name) = project.with_state(|st| -> Result<(Link, String)> {
            st.ensure_open(project_id)?;
            let link = st.link(link_id)?.clone();
            if link.capture.is_active() {
                return Err(Error::conflict(format!("链路 {} 正在抓包", link_id)));
            }
            let [a, b] = link.nodes;
            let name = format!(
                "{}_{}-{}_to_{}_{}-{}.pcap",
                sanitize_file_name(&st.node(a.node_id)?.name),
                a.adapter_number,
                a.port_number,
                sanitize_file_name(&st.node(b.node_id)?.name),
                b.adapter_number,
                b.port_number
            );
            Ok((link, name))
        })?;

        // 优先在非内置节点一侧抓包
        let side = link
            .tunnel
            .iter()
            .find(|side| !side.node_type.is_builtin())
            .unwrap_or(&link.tunnel[0])
            .clone();
        let capture_file_name = dto.capture_file_name.unwrap_or(default_name);

        let op = ComputeOperation::StartCapture {
            target: side.port_target(project_id),
            capture: CaptureRequest {
                capture_file_name: capture_file_name.clone(),
                data_link_type,
            },
        };
        self.state.computes.invoke(&side.compute_id, op).await?;

        let link = project.with_state(|st| -> Result<Link> {
            let link = st.link_mut(link_id)?;
            link.capture = CaptureState::Capturing {
                capture_file_name,
                data_link_type,
                endpoint: side.endpoint,
            };
            let link = link.clone();
            self.state
                .notifications
                .publish(project_id, "link.updated", event(&link));
            Ok(link)
        })?;
        info!("📦 链路 {} 开始抓包 ({})", link_id, data_link_type.as_str());
        Ok(link)
    }

    /// 停止抓包；未在抓包时直接成功
    pub async fn stop_capture(&self, project_id: Uuid, link_id: Uuid) -> Result<Link> {
        let project = self.state.projects.get(project_id).await?;
        let link = project.with_state(|st| {
            st.ensure_open(project_id)?;
            st.link(link_id).cloned()
        })?;

        let endpoint = match link.capture {
            CaptureState::Capturing { endpoint, .. } => endpoint,
            CaptureState::Inactive => {
                debug!("链路 {} 未在抓包", link_id);
                return Ok(link);
            }
        };
        let side = link
            .side(&endpoint)
            .ok_or_else(|| Error::Internal(format!("抓包端点不属于链路 {}", link_id)))?;

        let op = ComputeOperation::StopCapture {
            target: side.port_target(project_id),
        };
        self.state.computes.invoke(&side.compute_id, op).await?;

        self.reset_capture(&project, link_id)
            .ok_or_else(|| Error::not_found(format!("链路不存在: {}", link_id)))
    }

    fn reset_capture(&self, project: &Project, link_id: Uuid) -> Option<Link> {
        let project_id = project.project_id;
        project.with_state(|st| {
            let link = st.links.get_mut(&link_id)?;
            if !link.capture.is_active() {
                return Some(link.clone());
            }
            link.capture = CaptureState::Inactive;
            let link = link.clone();
            self.state
                .notifications
                .publish(project_id, "link.updated", event(&link));
            Some(link)
        })
    }

    /// 节点停止后停止相连链路上的抓包，链路本身保留
    pub async fn stop_captures_for_node(&self, project: &Project, node_id: Uuid) {
        let capturing: Vec<Uuid> = project.with_state(|st| {
            st.links
                .values()
                .filter(|link| link.touches(node_id) && link.capture.is_active())
                .map(|link| link.link_id)
                .collect()
        });

        for link_id in capturing {
            if let Err(e) = self.stop_capture(project.project_id, link_id).await {
                warn!("停止链路 {} 抓包失败，仍重置抓包状态: {}", link_id, e);
                self.reset_capture(project, link_id);
            }
        }
    }
}

/// Compute 作为隧道对端时的地址，必须能被其他 Compute 访问
fn tunnel_address(compute: &Compute) -> Result<String> {
    let address = compute.tunnel_host();
    if is_local_only_host(address) {
        return Err(Error::validation(format!(
            "Compute {} 的地址 {} 无法被其他 Compute 访问，请配置 host_ip",
            compute.compute_id, address
        )));
    }
    Ok(address.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::node::CreateNodeDto;
    use crate::services::node_service::NodeService;
    use crate::services::project_service::ProjectService;
    use crate::testing::{add_fake_compute, compute_spec, register_fake, test_state};
    use common::compute_api::{ComputeError, ComputeErrorCode};
    use serde_json::json;

    async fn setup_nodes(state: &AppState, computes: [&str; 2]) -> (Uuid, Node, Node) {
        let project_id = ProjectService::new(state.clone())
            .create_project("test".to_string())
            .await
            .unwrap()
            .project_id;
        let nodes = NodeService::new(state.clone());
        let mut created = Vec::new();
        for (i, compute_id) in computes.iter().enumerate() {
            let dto: CreateNodeDto = serde_json::from_value(json!({
                "name": format!("PC{}", i + 1),
                "node_type": "vpcs",
                "compute_id": compute_id,
            }))
            .unwrap();
            created.push(nodes.create_node(project_id, dto).await.unwrap());
        }
        let b = created.pop().unwrap();
        let a = created.pop().unwrap();
        (project_id, a, b)
    }

    fn endpoint(node: &Node) -> Endpoint {
        Endpoint {
            node_id: node.node_id,
            adapter_number: 0,
            port_number: 0,
        }
    }

    fn link_dto(a: &Node, b: &Node) -> CreateLinkDto {
        CreateLinkDto {
            nodes: vec![endpoint(a), endpoint(b)],
        }
    }

    fn nios(calls: &[ComputeOperation]) -> Vec<Nio> {
        calls
            .iter()
            .filter_map(|op| match op {
                ComputeOperation::AddNio { nio, .. } => Some(nio.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_same_compute_tunnel_uses_loopback() {
        let (state, fake) = test_state().await;
        let (project_id, a, b) = setup_nodes(&state, ["local", "local"]).await;
        let service = LinkService::new(state.clone());

        let link = service.create_link(project_id, link_dto(&a, &b)).await.unwrap();
        assert_eq!(link.nodes, [endpoint(&a), endpoint(&b)]);
        assert_eq!(
            nios(&fake.calls()),
            vec![
                Nio::Udp { lport: 10000, rhost: "127.0.0.1".to_string(), rport: 10001 },
                Nio::Udp { lport: 10001, rhost: "127.0.0.1".to_string(), rport: 10000 },
            ]
        );
    }

    #[tokio::test]
    async fn test_cross_compute_tunnel_uses_peer_hosts() {
        let (state, _) = test_state().await;
        let mut spec = compute_spec("a", "127.0.0.1");
        spec.host_ip = Some("192.168.1.10".to_string());
        let compute_a = register_fake(&state, spec).await;
        let compute_b = add_fake_compute(&state, "b", "10.0.0.2").await;
        let (project_id, a, b) = setup_nodes(&state, ["a", "b"]).await;

        LinkService::new(state.clone())
            .create_link(project_id, link_dto(&a, &b))
            .await
            .unwrap();

        // 两侧各自从自己的端口池分配，对端地址优先使用 host_ip
        assert_eq!(
            nios(&compute_a.calls()),
            vec![Nio::Udp { lport: 10000, rhost: "10.0.0.2".to_string(), rport: 10000 }]
        );
        assert_eq!(
            nios(&compute_b.calls()),
            vec![Nio::Udp { lport: 10000, rhost: "192.168.1.10".to_string(), rport: 10000 }]
        );
    }

    #[tokio::test]
    async fn test_loopback_compute_cannot_reach_remote_peer() {
        let (state, local) = test_state().await;
        let remote = add_fake_compute(&state, "remote", "10.0.0.2").await;
        let (project_id, a, b) = setup_nodes(&state, ["local", "remote"]).await;
        let service = LinkService::new(state.clone());

        let err = service.create_link(project_id, link_dto(&a, &b)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(local.count("add_nio"), 0);
        assert_eq!(remote.count("add_nio"), 0);
        assert!(service.list_links(project_id).await.unwrap().is_empty());

        // 端口已归还
        assert_eq!(state.allocator.allocate_udp_port("local").unwrap(), 10000);
        assert_eq!(state.allocator.allocate_udp_port("remote").unwrap(), 10000);
    }

    #[tokio::test]
    async fn test_topology_scenario() {
        let (state, fake) = test_state().await;
        let (project_id, a, b) = setup_nodes(&state, ["local", "local"]).await;
        assert_ne!(a.console, b.console);
        assert_eq!(a.status, common::models::NodeStatus::Stopped);
        assert_eq!(b.status, common::models::NodeStatus::Stopped);

        let service = LinkService::new(state.clone());
        let nodes = NodeService::new(state.clone());
        let link = service.create_link(project_id, link_dto(&a, &b)).await.unwrap();
        assert_eq!(link.nodes, [endpoint(&a), endpoint(&b)]);

        nodes.start_node(project_id, a.node_id).await.unwrap();
        nodes.start_node(project_id, b.node_id).await.unwrap();

        service.delete_link(project_id, link.link_id).await.unwrap();
        assert_eq!(fake.count("delete_nio"), 2);
        let relinked = service.create_link(project_id, link_dto(&a, &b)).await.unwrap();
        assert_ne!(relinked.link_id, link.link_id);

        let events = state.notifications.poll(project_id, 0).unwrap();
        let actions: Vec<&str> = events.iter().map(|n| n.action.as_str()).collect();
        assert_eq!(
            actions,
            vec![
                "node.created",
                "node.created",
                "link.created",
                "node.updated",
                "node.updated",
                "link.deleted",
                "link.created",
            ]
        );
        assert_eq!(events.iter().map(|n| n.seq).collect::<Vec<_>>(), (1..=7).collect::<Vec<u64>>());

        let id = |i: usize| events[i].event["node_id"].as_str().unwrap().to_string();
        assert_eq!(id(3), a.node_id.to_string());
        assert_eq!(id(4), b.node_id.to_string());
        assert_eq!(events[3].event["status"], "started");
        assert_eq!(events[4].event["status"], "started");
        assert_eq!(events[5].event["link_id"], link.link_id.to_string());
        assert_eq!(events[6].event["link_id"], relinked.link_id.to_string());
    }

    #[tokio::test]
    async fn test_occupied_endpoint_is_conflict_without_nio() {
        let (state, fake) = test_state().await;
        let (project_id, a, b) = setup_nodes(&state, ["local", "local"]).await;
        let c = NodeService::new(state.clone())
            .create_node(
                project_id,
                serde_json::from_value(json!({"name": "PC3", "node_type": "vpcs", "compute_id": "local"}))
                    .unwrap(),
            )
            .await
            .unwrap();
        let service = LinkService::new(state.clone());
        service.create_link(project_id, link_dto(&a, &b)).await.unwrap();
        let before = fake.count("add_nio");

        let err = service.create_link(project_id, link_dto(&a, &c)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(fake.count("add_nio"), before);
        assert_eq!(service.list_links(project_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_endpoints() {
        let (state, _) = test_state().await;
        let (project_id, a, _) = setup_nodes(&state, ["local", "local"]).await;
        let service = LinkService::new(state);

        let single = CreateLinkDto { nodes: vec![endpoint(&a)] };
        assert!(matches!(
            service.create_link(project_id, single).await,
            Err(Error::Validation(_))
        ));

        let mut other_port = endpoint(&a);
        other_port.adapter_number = 1;
        let looped = CreateLinkDto { nodes: vec![endpoint(&a), other_port] };
        assert!(matches!(
            service.create_link(project_id, looped).await,
            Err(Error::Validation(_))
        ));

        let unknown = Endpoint { node_id: Uuid::new_v4(), adapter_number: 0, port_number: 0 };
        let dto = CreateLinkDto { nodes: vec![endpoint(&a), unknown] };
        assert!(matches!(
            service.create_link(project_id, dto).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_second_nio_failure_rolls_back_first() {
        let (state, _) = test_state().await;
        let r1 = add_fake_compute(&state, "r1", "10.0.0.2").await;
        let r2 = add_fake_compute(&state, "r2", "10.0.0.3").await;
        let (project_id, a, b) = setup_nodes(&state, ["r1", "r2"]).await;
        let service = LinkService::new(state.clone());

        r2.fail_on("add_nio", ComputeError::backend(400, "adapter does not exist"));
        let err = service.create_link(project_id, link_dto(&a, &b)).await.unwrap_err();
        assert_eq!(err.compute_code(), Some(ComputeErrorCode::BadRequest));

        // 被拒绝的一侧没有创建 NIO，无需删除
        assert_eq!(r1.count("delete_nio"), 1);
        assert_eq!(r2.count("delete_nio"), 0);
        assert!(service.list_links(project_id).await.unwrap().is_empty());

        // 端点与端口都已释放
        r2.clear_failures();
        service.create_link(project_id, link_dto(&a, &b)).await.unwrap();
        assert_eq!(
            nios(&r1.calls()).last(),
            Some(&Nio::Udp { lport: 10000, rhost: "10.0.0.3".to_string(), rport: 10000 })
        );
    }

    #[tokio::test]
    async fn test_timed_out_nio_is_deleted_before_port_reuse() {
        let (state, _) = test_state().await;
        let _r1 = add_fake_compute(&state, "r1", "10.0.0.2").await;
        let r2 = add_fake_compute(&state, "r2", "10.0.0.3").await;
        let (project_id, a, b) = setup_nodes(&state, ["r1", "r2"]).await;
        let service = LinkService::new(state.clone());

        // 超时的请求可能已在 Compute 上生效
        r2.fail_on("add_nio", ComputeError::timeout("add_nio 超时"));
        assert!(service.create_link(project_id, link_dto(&a, &b)).await.unwrap_err().is_transport());
        assert_eq!(r2.count("delete_nio"), 1);

        r2.clear_failures();
        service.create_link(project_id, link_dto(&a, &b)).await.unwrap();
        assert_eq!(
            nios(&r2.calls()).last(),
            Some(&Nio::Udp { lport: 10000, rhost: "10.0.0.2".to_string(), rport: 10000 })
        );
    }

    #[tokio::test]
    async fn test_unconfirmed_nio_keeps_port_reserved() {
        let (state, _) = test_state().await;
        let _r1 = add_fake_compute(&state, "r1", "10.0.0.2").await;
        let r2 = add_fake_compute(&state, "r2", "10.0.0.3").await;
        let (project_id, a, b) = setup_nodes(&state, ["r1", "r2"]).await;
        let service = LinkService::new(state.clone());

        r2.fail_on("add_nio", ComputeError::timeout("add_nio 超时"));
        r2.fail_on("delete_nio", ComputeError::connection_failed("连接被重置"));
        service.create_link(project_id, link_dto(&a, &b)).await.unwrap_err();

        // r2 上的 10000 可能仍被残留的 NIO 占用
        r2.clear_failures();
        service.create_link(project_id, link_dto(&a, &b)).await.unwrap();
        assert_eq!(
            nios(&r2.calls()).last(),
            Some(&Nio::Udp { lport: 10001, rhost: "10.0.0.2".to_string(), rport: 10000 })
        );
    }

    #[tokio::test]
    async fn test_delete_link_keeps_unconfirmed_ports() {
        let (state, fake) = test_state().await;
        let (project_id, a, b) = setup_nodes(&state, ["local", "local"]).await;
        let service = LinkService::new(state.clone());

        let link = service.create_link(project_id, link_dto(&a, &b)).await.unwrap();
        fake.fail_on("delete_nio", ComputeError::timeout("delete_nio 超时"));
        service.delete_link(project_id, link.link_id).await.unwrap();

        fake.clear_failures();
        service.create_link(project_id, link_dto(&a, &b)).await.unwrap();
        assert_eq!(
            nios(&fake.calls())[2..],
            [
                Nio::Udp { lport: 10002, rhost: "127.0.0.1".to_string(), rport: 10003 },
                Nio::Udp { lport: 10003, rhost: "127.0.0.1".to_string(), rport: 10002 },
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_link_restores_endpoints() {
        let (state, fake) = test_state().await;
        let (project_id, a, b) = setup_nodes(&state, ["local", "local"]).await;
        let service = LinkService::new(state.clone());

        let link = service.create_link(project_id, link_dto(&a, &b)).await.unwrap();
        // 一侧已不存在也不影响删除
        fake.fail_on("delete_nio", ComputeError::backend(404, "no nio"));
        service.delete_link(project_id, link.link_id).await.unwrap();
        assert_eq!(fake.count("delete_nio"), 2);

        fake.clear_failures();
        service.create_link(project_id, link_dto(&a, &b)).await.unwrap();
        assert!(matches!(
            service.delete_link(project_id, Uuid::new_v4()).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_capture_lifecycle() {
        let (state, fake) = test_state().await;
        let (project_id, a, b) = setup_nodes(&state, ["local", "local"]).await;
        let service = LinkService::new(state.clone());
        let link = service.create_link(project_id, link_dto(&a, &b)).await.unwrap();

        // 未抓包时停止是空操作
        service.stop_capture(project_id, link.link_id).await.unwrap();
        assert_eq!(fake.count("stop_capture"), 0);

        let capturing = service
            .start_capture(project_id, link.link_id, StartCaptureDto::default())
            .await
            .unwrap();
        match &capturing.capture {
            CaptureState::Capturing { capture_file_name, data_link_type, endpoint: ep } => {
                assert_eq!(capture_file_name, "PC1_0-0_to_PC2_0-0.pcap");
                assert_eq!(*data_link_type, DataLinkType::En10mb);
                assert_eq!(*ep, endpoint(&a));
            }
            other => panic!("期望正在抓包，实际: {:?}", other),
        }
        assert!(matches!(
            service
                .start_capture(project_id, link.link_id, StartCaptureDto::default())
                .await,
            Err(Error::Conflict(_))
        ));

        let stopped = service.stop_capture(project_id, link.link_id).await.unwrap();
        assert_eq!(stopped.capture, CaptureState::Inactive);
        service.stop_capture(project_id, link.link_id).await.unwrap();
        assert_eq!(fake.count("stop_capture"), 1);
    }

    #[tokio::test]
    async fn test_capture_rejects_unknown_link_type() {
        let (state, fake) = test_state().await;
        let (project_id, a, b) = setup_nodes(&state, ["local", "local"]).await;
        let service = LinkService::new(state.clone());
        let link = service.create_link(project_id, link_dto(&a, &b)).await.unwrap();

        let dto = StartCaptureDto {
            capture_file_name: None,
            data_link_type: Some("DLT_BOGUS".to_string()),
        };
        assert!(matches!(
            service.start_capture(project_id, link.link_id, dto).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(fake.count("start_capture"), 0);
    }

    #[tokio::test]
    async fn test_stopping_node_stops_capture_but_keeps_link() {
        let (state, fake) = test_state().await;
        let (project_id, a, b) = setup_nodes(&state, ["local", "local"]).await;
        let service = LinkService::new(state.clone());
        let nodes = NodeService::new(state.clone());
        let link = service.create_link(project_id, link_dto(&a, &b)).await.unwrap();

        nodes.start_node(project_id, a.node_id).await.unwrap();
        service
            .start_capture(project_id, link.link_id, StartCaptureDto::default())
            .await
            .unwrap();

        // 后端抓包已随节点停止而结束
        fake.fail_on("stop_capture", ComputeError::backend(404, "gone"));
        nodes.stop_node(project_id, a.node_id).await.unwrap();

        let current = service.get_link(project_id, link.link_id).await.unwrap();
        assert_eq!(current.capture, CaptureState::Inactive);
        assert_eq!(fake.count("delete_nio"), 0);
    }
}
