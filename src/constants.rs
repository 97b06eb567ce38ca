pub const CLIENT_USER_AGENT: &str = "meshhub-client/0.1";
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
pub const TOKEN_MODE_ANON: &str = "anon";
pub const TOKEN_SAFETY_MARGIN_SECONDS: u64 = 5;
pub const POLL_MAX_ATTEMPTS: u32 = 30;
pub const POLL_INTERVAL_MS: u64 = 2000;
pub const CHAT_FREE_LIMIT: u32 = 3;
pub const QUOTA_STORAGE_KEY: &str = "cgpt_free_quota_v1";
pub const THREAD_STORAGE_KEY: &str = "cgpt_thread_id";
pub const COMPLIANCE_AUDIT_KIND: &str = "compliance_audit";
pub const DEMO_AGENT: &str = "proto-kernel-lite";
