//! 客户端 IP 提取
//!
//! 反向代理后面取 X-Forwarded-For 的第一跳，其次 X-Real-IP，
//! 最后退回连接对端地址。提取出的 IP 只用于哈希，从不落盘。

use actix_web::HttpRequest;

/// 从请求头提取转发的 IP（X-Forwarded-For 或 X-Real-IP）
pub fn extract_forwarded_ip_from_headers(
    headers: &actix_web::http::header::HeaderMap,
) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(String::from)
        })
}

/// 提取真实客户端 IP
pub fn extract_client_ip(req: &HttpRequest) -> Option<String> {
    extract_forwarded_ip_from_headers(req.headers())
        .or_else(|| req.peer_addr().map(|addr| addr.ip().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_forwarded_for_takes_first_hop() {
        let req = TestRequest::default()
            .insert_header(("x-forwarded-for", "203.0.113.7, 10.0.0.1, 10.0.0.2"))
            .to_http_request();
        assert_eq!(extract_client_ip(&req), Some("203.0.113.7".to_string()));
    }

    #[test]
    fn test_real_ip_fallback() {
        let req = TestRequest::default()
            .insert_header(("x-real-ip", "198.51.100.4"))
            .to_http_request();
        assert_eq!(extract_client_ip(&req), Some("198.51.100.4".to_string()));
    }

    #[test]
    fn test_no_headers_no_peer() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(extract_client_ip(&req), None);
    }
}
