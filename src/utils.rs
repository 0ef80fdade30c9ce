use convert_case::{Case, Casing};

pub fn remove_trailling_slash(string: &str) -> String {
    if let Some(end) = string.strip_suffix('/') {
        end.to_string()
    } else {
        string.to_string()
    }
}

/// Turns a resource name into a DNS-1123 label usable as a kubernetes object name.
///
/// `gpu_worker`, `GpuWorker` and `gpu worker` all become `gpu-worker`.
/// The result is truncated to 63 characters.
pub fn to_dns_label(name: &str) -> String {
    let kebab = name.to_case(Case::Kebab);

    let label: String = kebab
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    let label = label.trim_matches('-');
    let label = if label.len() > 63 { &label[..63] } else { label };

    label.trim_end_matches('-').to_string()
}
