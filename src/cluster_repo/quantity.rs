// Kubernetes quantity strings → canonical units (CPU cores, GiB)

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;
const MIB_PER_GIB: f64 = 1024.0;
const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// "250m" → 0.25, "2" → 2.0.
pub fn parse_cpu_cores(raw: &str) -> Option<f64> {
    let s = raw.trim();
    match s.strip_suffix('m') {
        Some(milli) => milli.parse::<f64>().ok().map(|v| v / 1000.0),
        None => s.parse().ok(),
    }
}

/// "1048576Ki" / "1024Mi" / "1Gi" → 1.0; a bare number is bytes.
pub fn parse_memory_gib(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if let Some(v) = s.strip_suffix("Ki") {
        return v.parse::<f64>().ok().map(|v| v / KIB_PER_GIB);
    }
    if let Some(v) = s.strip_suffix("Mi") {
        return v.parse::<f64>().ok().map(|v| v / MIB_PER_GIB);
    }
    if let Some(v) = s.strip_suffix("Gi") {
        return v.parse().ok();
    }
    s.parse::<f64>().ok().map(|v| v / BYTES_PER_GIB)
}

pub fn parse_pod_count(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}
