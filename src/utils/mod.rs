pub mod ip;

use xxhash_rust::xxh64::xxh64;

/// 短码格式校验：字母数字，长度 4-12
///
/// 非法短码在进任何 I/O 之前就被拒绝，同时防止畸形 key 进入缓存命名空间。
pub fn is_valid_short_code(code: &str) -> bool {
    let len = code.len();
    (4..=12).contains(&len) && code.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// 客户端标识哈希（xxh64，十六进制定长 16 字符）
///
/// 原始 IP / 标识串从不落盘，只保留哈希。
pub fn hash_identity(raw: &str) -> String {
    format!("{:016x}", xxh64(raw.as_bytes(), 0))
}

/// 标识的数值哈希，供频率追踪和布隆过滤器寻址使用
pub fn hash_identity_u64(raw: &str) -> u64 {
    xxh64(raw.as_bytes(), 0)
}

/// 截断自由文本字段到 max_len 字节，保持 UTF-8 边界
pub fn truncate_utf8(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_short_codes() {
        assert!(is_valid_short_code("abc1"));
        assert!(is_valid_short_code("abc123"));
        assert!(is_valid_short_code("ABCdef789012"));
    }

    #[test]
    fn test_invalid_short_codes() {
        // 太短 / 太长
        assert!(!is_valid_short_code("abc"));
        assert!(!is_valid_short_code("abcdefghij123"));
        // 非法字符
        assert!(!is_valid_short_code("abc-123"));
        assert!(!is_valid_short_code("abc 123"));
        assert!(!is_valid_short_code("<script>"));
        assert!(!is_valid_short_code(""));
        assert!(!is_valid_short_code("中文短码"));
    }

    #[test]
    fn test_hash_identity_stable() {
        let a = hash_identity("203.0.113.7");
        let b = hash_identity("203.0.113.7");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        // 不同输入产生不同哈希
        assert_ne!(a, hash_identity("203.0.113.8"));
    }

    #[test]
    fn test_truncate_utf8_boundary() {
        assert_eq!(truncate_utf8("hello", 10), "hello");
        assert_eq!(truncate_utf8("hello", 3), "hel");
        // 不会切断多字节字符
        let s = "ab中文";
        let t = truncate_utf8(s, 3);
        assert!(s.starts_with(t));
        assert!(t.len() <= 3);
    }
}
