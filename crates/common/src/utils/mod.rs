/// 工具函数集合

use std::net::IpAddr;

use uuid::Uuid;

/// 生成唯一 ID
pub fn generate_id() -> Uuid {
    Uuid::new_v4()
}

/// 将名称规整为文件名安全的形式（仅保留字母、数字、`_` 与 `-`）
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// 校验主机名或 IP 地址（简单校验）
pub fn validate_host(host: &str) -> bool {
    !host.is_empty()
        && host.len() <= 253
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == ':')
}

/// 是否为只在本机有效的地址（回环或未指定地址）
pub fn is_local_only_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    match host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
        Ok(ip) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}
