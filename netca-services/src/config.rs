// CA Configuration
//
// `CaConfig` is built with `new().with_*()` or loaded from JSON. The root
// authority it describes is loaded exactly once, when `CaService` is created.
//
// ```rust,no_run
// use netca_services::config::{CaConfig, OrdinalFailurePolicy, RootAuthoritySource};
//
// let config = CaConfig::new(RootAuthoritySource::PemFiles {
//     cert_path: "/etc/netca/root.pem".into(),
//     key_path: "/etc/netca/root.key".into(),
// })
// .with_node_validity_days(90)
// .with_ordinal_failure_policy(OrdinalFailurePolicy::Propagate);
// ```

use std::fmt;
use std::path::{Path, PathBuf};

use netca_common::logging::LoggingConfig;
use netca_keys::{CertificateAuthority, ValidityPolicy};
use serde::{Deserialize, Serialize};

use crate::error::{CaError, Result};

pub const DEFAULT_ADMIN_VALIDITY_DAYS: u32 = 3650;
pub const DEFAULT_NODE_VALIDITY_DAYS: u32 = 365;
pub const DEFAULT_REVOKE_PAGE_SIZE: usize = 256;

/// Where the root signing material comes from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RootAuthoritySource {
    /// Fresh self-signed root, for tests and single-process setups
    SelfSigned { subject: String },
    PemFiles {
        cert_path: PathBuf,
        key_path: PathBuf,
    },
    Pem { cert_pem: String, key_pem: String },
}

impl RootAuthoritySource {
    /// Load the root authority. Any failure is a configuration error.
    pub fn load(&self) -> Result<CertificateAuthority> {
        let loaded = match self {
            RootAuthoritySource::SelfSigned { subject } => {
                CertificateAuthority::self_signed(subject)
            }
            RootAuthoritySource::PemFiles {
                cert_path,
                key_path,
            } => {
                let cert_pem = read_pem(cert_path)?;
                let key_pem = read_pem(key_path)?;
                CertificateAuthority::from_pem(&cert_pem, &key_pem)
            }
            RootAuthoritySource::Pem { cert_pem, key_pem } => {
                CertificateAuthority::from_pem(cert_pem, key_pem)
            }
        };
        loaded.map_err(|e| CaError::Configuration(format!("failed to load root authority: {e}")))
    }
}

fn read_pem(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        CaError::Configuration(format!("failed to read {}: {e}", path.display()))
    })
}

/// What AddNode does when the node count under an admin cannot be read
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrdinalFailurePolicy {
    /// Log a warning and report success without registering the node
    #[default]
    SoftSucceed,
    /// Fail the call with a persistence error
    Propagate,
}

/// CA Configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CaConfig {
    /// Instance id printed on every log line
    #[serde(default = "default_instance_id")]
    pub instance_id: String,

    pub root_authority: RootAuthoritySource,

    #[serde(default = "default_admin_validity_days")]
    pub admin_validity_days: u32,

    #[serde(default = "default_node_validity_days")]
    pub node_validity_days: u32,

    #[serde(default)]
    pub ordinal_failure_policy: OrdinalFailurePolicy,

    /// Entries fetched per store round trip when listing revocations
    #[serde(default = "default_revoke_page_size")]
    pub revoke_page_size: usize,

    /// Logging configuration options
    #[serde(default)]
    pub logging_config: Option<LoggingConfig>,
}

fn default_instance_id() -> String {
    "netca".to_string()
}

fn default_admin_validity_days() -> u32 {
    DEFAULT_ADMIN_VALIDITY_DAYS
}

fn default_node_validity_days() -> u32 {
    DEFAULT_NODE_VALIDITY_DAYS
}

fn default_revoke_page_size() -> usize {
    DEFAULT_REVOKE_PAGE_SIZE
}

impl CaConfig {
    pub fn new(root_authority: RootAuthoritySource) -> Self {
        Self {
            instance_id: default_instance_id(),
            root_authority,
            admin_validity_days: DEFAULT_ADMIN_VALIDITY_DAYS,
            node_validity_days: DEFAULT_NODE_VALIDITY_DAYS,
            ordinal_failure_policy: OrdinalFailurePolicy::default(),
            revoke_page_size: DEFAULT_REVOKE_PAGE_SIZE,
            logging_config: Some(LoggingConfig::default_info()),
        }
    }

    /// Configuration with a throwaway self-signed root
    pub fn self_signed(subject: impl Into<String>) -> Self {
        Self::new(RootAuthoritySource::SelfSigned {
            subject: subject.into(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CaError::Configuration(format!("invalid CA configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = instance_id.into();
        self
    }

    pub fn with_admin_validity_days(mut self, days: u32) -> Self {
        self.admin_validity_days = days;
        self
    }

    pub fn with_node_validity_days(mut self, days: u32) -> Self {
        self.node_validity_days = days;
        self
    }

    pub fn with_ordinal_failure_policy(mut self, policy: OrdinalFailurePolicy) -> Self {
        self.ordinal_failure_policy = policy;
        self
    }

    pub fn with_revoke_page_size(mut self, page_size: usize) -> Self {
        self.revoke_page_size = page_size;
        self
    }

    /// Add logging configuration
    pub fn with_logging_config(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self
    }

    pub fn validity_policy(&self) -> ValidityPolicy {
        ValidityPolicy {
            admin_validity_days: self.admin_validity_days,
            node_validity_days: self.node_validity_days,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.admin_validity_days == 0 || self.node_validity_days == 0 {
            return Err(CaError::Configuration(
                "validity periods must be at least one day".to_string(),
            ));
        }
        if self.revoke_page_size == 0 {
            return Err(CaError::Configuration(
                "revoke_page_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for CaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let root = match &self.root_authority {
            RootAuthoritySource::SelfSigned { subject } => format!("self-signed '{subject}'"),
            RootAuthoritySource::PemFiles { cert_path, .. } => {
                format!("file {}", cert_path.display())
            }
            RootAuthoritySource::Pem { .. } => "inline PEM".to_string(),
        };
        write!(
            f,
            "CaConfig: instance:{} root:{} admin_validity:{}d node_validity:{}d ordinal_policy:{:?} page:{}",
            self.instance_id,
            root,
            self.admin_validity_days,
            self.node_validity_days,
            self.ordinal_failure_policy,
            self.revoke_page_size
        )
    }
}
