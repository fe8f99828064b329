//! Opaque prefixed ids, mirroring the original `uuid4().hex[:N]` convention
//! (`mem_`, `job_`, `rec_`) but backed by `uuid` v4 for collision resistance.

pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", uuid::Uuid::new_v4().simple())
}

pub fn new_memory_id() -> String {
    new_id("mem")
}

pub fn new_job_id() -> String {
    new_id("job")
}

pub fn new_trace_id() -> String {
    new_id("trc")
}
