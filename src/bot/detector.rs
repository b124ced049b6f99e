//! 机器人检测
//!
//! 有序检查，首个命中即返回：
//! 1. User-Agent 缺失或空白 → bot (0.9)
//! 2. 爬虫 / 工具 / 自动化特征签名 → bot (0.95)
//! 3. 标识高频（信誉过滤器或频率追踪） → bot (0.8)
//! 4. 可疑形态（过短、裸框架 token） → bot (0.6)
//! 5. 都不命中 → 非 bot (0.0)
//!
//! 除第 3 步外全部无状态。

use std::sync::Arc;

use tracing::trace;
use woothee::parser::Parser;

use crate::bot::{FrequencyTracker, IpReputationFilter};
use crate::utils::hash_identity_u64;

/// 人工维护的签名列表，命中任意一条即判定为自动化流量。
/// 全部小写，匹配前先把 UA 转小写。
const BOT_SIGNATURES: &[&str] = &[
    "bot",
    "crawler",
    "spider",
    "scraper",
    "curl/",
    "wget/",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "java/",
    "okhttp",
    "httpclient",
    "axios/",
    "node-fetch",
    "scrapy",
    "phantomjs",
    "headlesschrome",
    "selenium",
    "playwright",
    "puppeteer",
    "facebookexternalhit",
    "slackbot",
    "twitterbot",
    "telegrambot",
    "discordbot",
    "whatsapp",
    "monitoring",
    "uptime",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotReason {
    MissingUserAgent,
    SignaturePattern,
    HighFrequency,
    SuspiciousShape,
    None,
}

impl BotReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotReason::MissingUserAgent => "missing_user_agent",
            BotReason::SignaturePattern => "signature_pattern",
            BotReason::HighFrequency => "high_frequency",
            BotReason::SuspiciousShape => "suspicious_shape",
            BotReason::None => "none",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotVerdict {
    pub is_bot: bool,
    pub reason: BotReason,
    pub confidence: f32,
}

impl BotVerdict {
    fn bot(reason: BotReason, confidence: f32) -> Self {
        Self {
            is_bot: true,
            reason,
            confidence,
        }
    }

    fn human() -> Self {
        Self {
            is_bot: false,
            reason: BotReason::None,
            confidence: 0.0,
        }
    }
}

pub struct BotDetector {
    frequency: Arc<FrequencyTracker>,
    reputation: Arc<IpReputationFilter>,
    ua_parser: Parser,
}

impl BotDetector {
    pub fn new(frequency: Arc<FrequencyTracker>, reputation: Arc<IpReputationFilter>) -> Self {
        Self {
            frequency,
            reputation,
            ua_parser: Parser::new(),
        }
    }

    pub async fn detect(
        &self,
        user_agent: Option<&str>,
        identity_hash: Option<&str>,
    ) -> BotVerdict {
        // (a) 缺失 / 空白 UA
        let Some(ua) = user_agent.map(str::trim).filter(|ua| !ua.is_empty()) else {
            return BotVerdict::bot(BotReason::MissingUserAgent, 0.9);
        };

        // (b) 签名匹配
        if Self::matches_signature(ua) || self.classified_as_crawler(ua) {
            return BotVerdict::bot(BotReason::SignaturePattern, 0.95);
        }

        // (c) 高频标识（与频率追踪 / 信誉过滤器共享状态）
        if let Some(identity) = identity_hash {
            if self.reputation.might_contain(identity) {
                trace!("Identity {} already flagged by reputation filter", identity);
                return BotVerdict::bot(BotReason::HighFrequency, 0.8);
            }

            let result = self.frequency.check(hash_identity_u64(identity)).await;
            if result.is_high_frequency {
                // 高频标识进信誉过滤器，后续请求不再打到共享存储
                self.reputation.add(identity).await;
                return BotVerdict::bot(BotReason::HighFrequency, 0.8);
            }
        }

        // (d) 可疑形态
        if Self::suspicious_shape(ua) {
            return BotVerdict::bot(BotReason::SuspiciousShape, 0.6);
        }

        BotVerdict::human()
    }

    fn matches_signature(ua: &str) -> bool {
        let lowered = ua.to_lowercase();
        BOT_SIGNATURES.iter().any(|sig| lowered.contains(sig))
    }

    fn classified_as_crawler(&self, ua: &str) -> bool {
        self.ua_parser
            .parse(ua)
            .map(|parsed| parsed.category == "crawler")
            .unwrap_or(false)
    }

    /// 过短的 UA，或单个裸 token（如 "Mozilla/5.0"、"Dart/2.19"）
    fn suspicious_shape(ua: &str) -> bool {
        if ua.len() < 10 {
            return true;
        }
        !ua.contains(' ') && ua.contains('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BotConfig;

    fn detector() -> BotDetector {
        let config = BotConfig::default();
        BotDetector::new(
            Arc::new(FrequencyTracker::new(None, &config)),
            Arc::new(IpReputationFilter::new(
                config.bloom_expected_items,
                config.bloom_fp_rate,
                None,
            )),
        )
    }

    const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    #[tokio::test]
    async fn test_missing_user_agent() {
        let d = detector();

        let verdict = d.detect(None, None).await;
        assert!(verdict.is_bot);
        assert_eq!(verdict.reason, BotReason::MissingUserAgent);
        assert!((verdict.confidence - 0.9).abs() < f32::EPSILON);

        // 空白等同缺失
        let verdict = d.detect(Some("   "), None).await;
        assert_eq!(verdict.reason, BotReason::MissingUserAgent);
    }

    #[tokio::test]
    async fn test_signature_patterns() {
        let d = detector();

        for ua in [
            "curl/8.4.0",
            "python-requests/2.31.0",
            "Googlebot/2.1 (+http://www.google.com/bot.html)",
            "Mozilla/5.0 (compatible; AhrefsBot/7.0; +http://ahrefs.com/robot/)",
        ] {
            let verdict = d.detect(Some(ua), None).await;
            assert!(verdict.is_bot, "Expected bot verdict for {ua}");
            assert_eq!(verdict.reason, BotReason::SignaturePattern);
            assert!((verdict.confidence - 0.95).abs() < f32::EPSILON);
        }
    }

    #[tokio::test]
    async fn test_high_frequency_identity() {
        let config = BotConfig {
            frequency_threshold: 3,
            ..BotConfig::default()
        };
        let d = BotDetector::new(
            Arc::new(FrequencyTracker::new(None, &config)),
            Arc::new(IpReputationFilter::new(1000, 0.01, None)),
        );

        let identity = "deadbeefdeadbeef";
        for _ in 0..3 {
            let verdict = d.detect(Some(BROWSER_UA), Some(identity)).await;
            assert!(!verdict.is_bot);
        }

        let verdict = d.detect(Some(BROWSER_UA), Some(identity)).await;
        assert!(verdict.is_bot);
        assert_eq!(verdict.reason, BotReason::HighFrequency);
        assert!((verdict.confidence - 0.8).abs() < f32::EPSILON);

        // 高频标识已进信誉过滤器，即使频率回落也保持命中
        let verdict = d.detect(Some(BROWSER_UA), Some(identity)).await;
        assert!(verdict.is_bot);
        assert_eq!(verdict.reason, BotReason::HighFrequency);
    }

    #[tokio::test]
    async fn test_suspicious_shape() {
        let d = detector();

        let verdict = d.detect(Some("Mozilla/5.0"), None).await;
        assert!(verdict.is_bot);
        assert_eq!(verdict.reason, BotReason::SuspiciousShape);
        assert!((verdict.confidence - 0.6).abs() < f32::EPSILON);

        let verdict = d.detect(Some("abc"), None).await;
        assert_eq!(verdict.reason, BotReason::SuspiciousShape);
    }

    #[tokio::test]
    async fn test_regular_browser_passes() {
        let d = detector();

        let verdict = d.detect(Some(BROWSER_UA), Some("cafebabecafebabe")).await;
        assert!(!verdict.is_bot);
        assert_eq!(verdict.reason, BotReason::None);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_check_order_signature_before_frequency() {
        // 签名命中的 UA 即使携带标识也应返回 SignaturePattern
        let d = detector();
        let verdict = d.detect(Some("curl/8.4.0"), Some("deadbeefdeadbeef")).await;
        assert_eq!(verdict.reason, BotReason::SignaturePattern);
    }
}
