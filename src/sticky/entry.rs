use super::{Key, RateCounter};

/// The full counter bundle a sticky-table entry tracks, per §3.
#[derive(Debug, Clone, Default)]
pub struct CounterBundle {
    pub conn_cnt: u64,
    pub conn_cur: u32,
    pub conn_rate: RateCounter,
    pub sess_cnt: u64,
    pub sess_rate: RateCounter,
    pub http_req_cnt: u64,
    pub http_req_rate: RateCounter,
    pub http_err_cnt: u64,
    pub http_err_rate: RateCounter,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub server_id: u32,
    pub gpc0: u64,
    pub gpc1: u64,
}

/// One entry in the sticky table's stable-index arena.
#[derive(Debug, Clone)]
pub struct Entry {
    pub key: Key,
    pub counters: CounterBundle,
    pub expire_at_ms: u64,
    pub last_access_ms: u64,
    pub ref_cnt: u32,

    /// Index of the bucket this entry's chain lives in, so it can be
    /// unlinked without recomputing the key's hash.
    pub(super) bucket: usize,
    /// Intrusive links for the LRU list and the bucket's hash chain,
    /// expressed as arena indices instead of pointers.
    pub(super) lru_prev: Option<u32>,
    pub(super) lru_next: Option<u32>,
}

impl Entry {
    pub fn new(key: Key, bucket: usize, now_ms: u64, expire_ms: u64) -> Self {
        Self {
            key,
            counters: CounterBundle::default(),
            expire_at_ms: now_ms + expire_ms,
            last_access_ms: now_ms,
            ref_cnt: 0,
            bucket,
            lru_prev: None,
            lru_next: None,
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expire_at_ms
    }

    pub fn is_evictable(&self) -> bool {
        self.ref_cnt == 0
    }
}
