/// Dispatch-level configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Path the OData service is mounted under, e.g. `/odata`.
    pub service_path: String,
    /// Application prefix in front of the service path, if any.
    pub context_path: String,
    /// Leading resource-path segments reserved for service resolution.
    pub split: usize,
    /// Accept `/Set/key` in addition to `/Set(key)`.
    pub key_as_segment: bool,
    /// Largest request body read into memory.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service_path: "/odata".to_string(),
            context_path: String::new(),
            split: 0,
            key_as_segment: false,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.service_path, "/odata");
        assert!(config.context_path.is_empty());
        assert_eq!(config.split, 0);
        assert!(!config.key_as_segment);
        assert_eq!(config.max_body_bytes, 4_194_304);
    }
}
