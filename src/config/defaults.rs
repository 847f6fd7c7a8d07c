pub const DEFAULT_ENDPOINT: &str = "https://api.llama.com/v1";

pub fn default_stream_timeout() -> u64 {
    30
}

pub fn default_verbose() -> bool {
    false
}
