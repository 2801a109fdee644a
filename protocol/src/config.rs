//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use std::convert::TryFrom;
use std::fmt;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::error::PsiError;

pub const DEFAULT_BUCKET_SIZE: usize = 1 << 20;

/// Parameters of the differentially private variant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DpParams {
    /// Probability for rank 1 to keep each of its items
    pub bob_sub_sampling: f64,
    /// Privacy budget of the leader side sampling
    pub epsilon: f64,
    /// Makes sampling reproducible when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl DpParams {
    fn validate(&self) -> Result<(), PsiError> {
        if !(self.bob_sub_sampling > 0.0 && self.bob_sub_sampling <= 1.0) {
            return Err(PsiError::Config(format!(
                "bob_sub_sampling must be in (0, 1], got {}",
                self.bob_sub_sampling
            )));
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(PsiError::Config(format!(
                "epsilon must be a positive number, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtocolKind {
    Ecdh2pc,
    Ecdh3pc,
    Kkrt2pc,
    Dp2pc(DpParams),
}

impl ProtocolKind {
    pub fn name(&self) -> ProtocolName {
        match self {
            ProtocolKind::Ecdh2pc => ProtocolName::Ecdh2pc,
            ProtocolKind::Ecdh3pc => ProtocolName::Ecdh3pc,
            ProtocolKind::Kkrt2pc => ProtocolName::Kkrt2pc,
            ProtocolKind::Dp2pc(_) => ProtocolName::Dp2pc,
        }
    }

    pub fn world_size(&self) -> usize {
        match self {
            ProtocolKind::Ecdh3pc => 3,
            _ => 2,
        }
    }

    pub fn dp_params(&self) -> Option<&DpParams> {
        match self {
            ProtocolKind::Dp2pc(p) => Some(p),
            _ => None,
        }
    }
}

/// Protocol tag as it appears in configuration files and parameter messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolName {
    #[serde(rename = "ECDH_2PC")]
    Ecdh2pc,
    #[serde(rename = "ECDH_3PC")]
    Ecdh3pc,
    #[serde(rename = "KKRT_2PC")]
    Kkrt2pc,
    #[serde(rename = "DP_2PC")]
    Dp2pc,
}

impl fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProtocolName::Ecdh2pc => "ECDH_2PC",
            ProtocolName::Ecdh3pc => "ECDH_3PC",
            ProtocolName::Kkrt2pc => "KKRT_2PC",
            ProtocolName::Dp2pc => "DP_2PC",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurveType {
    #[serde(rename = "CURVE_25519")]
    Curve25519,
    #[serde(rename = "CURVE_FOURQ")]
    FourQ,
    #[serde(rename = "CURVE_SM2")]
    Sm2,
    #[serde(rename = "CURVE_SECP256K1")]
    Secp256k1,
}

impl Default for CurveType {
    fn default() -> Self {
        CurveType::Curve25519
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputParams {
    pub path: String,
    pub select_fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputParams {
    pub path: String,
    #[serde(default)]
    pub need_sort: bool,
}

/// What to run and who learns the result
///
/// Built with [`PsiConfig::builder`] or read from JSON:
///
/// ```
/// use protocol::config::PsiConfig;
///
/// let config = PsiConfig::from_json_str(
///     r#"{"protocol": "DP_2PC", "broadcast_result": true,
///         "extra": {"bob_sub_sampling": 0.9, "epsilon": 3}}"#,
/// )
/// .unwrap();
/// assert!(config.protocol.dp_params().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig", into = "RawConfig")]
pub struct PsiConfig {
    pub protocol: ProtocolKind,
    pub broadcast_result: bool,
    pub receiver_rank: Option<usize>,
    pub curve: CurveType,
    pub input: Option<InputParams>,
    pub output: Option<OutputParams>,
    pub bucket_size: usize,
}

/// Flat JSON layout of [`PsiConfig`], the DP payload lives in `extra`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    protocol: ProtocolName,
    #[serde(default)]
    broadcast_result: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    receiver_rank: Option<usize>,
    #[serde(default)]
    curve: CurveType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input: Option<InputParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output: Option<OutputParams>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bucket_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extra: Option<DpParams>,
}

impl TryFrom<RawConfig> for PsiConfig {
    type Error = PsiError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let protocol = match (raw.protocol, raw.extra) {
            (ProtocolName::Dp2pc, Some(p)) => ProtocolKind::Dp2pc(p),
            (ProtocolName::Dp2pc, None) => {
                return Err(PsiError::Config(String::from(
                    "DP_2PC needs dp parameters in `extra`",
                )))
            }
            (name, Some(_)) => {
                return Err(PsiError::Config(format!(
                    "dp parameters are not accepted by {}",
                    name
                )))
            }
            (ProtocolName::Ecdh2pc, None) => ProtocolKind::Ecdh2pc,
            (ProtocolName::Ecdh3pc, None) => ProtocolKind::Ecdh3pc,
            (ProtocolName::Kkrt2pc, None) => ProtocolKind::Kkrt2pc,
        };
        let config = PsiConfig {
            protocol,
            broadcast_result: raw.broadcast_result,
            receiver_rank: raw.receiver_rank,
            curve: raw.curve,
            input: raw.input,
            output: raw.output,
            bucket_size: raw.bucket_size.unwrap_or(DEFAULT_BUCKET_SIZE),
        };
        config.validate()?;
        Ok(config)
    }
}

impl From<PsiConfig> for RawConfig {
    fn from(c: PsiConfig) -> Self {
        RawConfig {
            protocol: c.protocol.name(),
            broadcast_result: c.broadcast_result,
            receiver_rank: c.receiver_rank,
            curve: c.curve,
            input: c.input,
            output: c.output,
            bucket_size: Some(c.bucket_size),
            extra: c.protocol.dp_params().copied(),
        }
    }
}

impl PsiConfig {
    pub fn builder(protocol: ProtocolKind) -> PsiConfigBuilder {
        PsiConfigBuilder {
            config: PsiConfig {
                protocol,
                broadcast_result: false,
                receiver_rank: None,
                curve: CurveType::default(),
                input: None,
                output: None,
                bucket_size: DEFAULT_BUCKET_SIZE,
            },
        }
    }

    pub fn from_json_str(s: &str) -> Result<PsiConfig, PsiError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file<T: AsRef<Path>>(path: T) -> Result<PsiConfig, PsiError> {
        let f = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(f))?)
    }

    pub fn to_json_string(&self) -> Result<String, PsiError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The party that learns the intersection inside a run
    pub fn leader(&self) -> usize {
        match (self.broadcast_result, self.receiver_rank) {
            (false, Some(r)) => r,
            _ => 0,
        }
    }

    /// Checks that do not depend on the session
    pub fn validate(&self) -> Result<(), PsiError> {
        if self.curve != CurveType::Curve25519 {
            return Err(PsiError::Config(format!(
                "curve {:?} is not supported, use CURVE_25519",
                self.curve
            )));
        }
        if !self.broadcast_result && self.receiver_rank.is_none() {
            return Err(PsiError::Config(String::from(
                "receiver_rank is required when broadcast_result is false",
            )));
        }
        if self.bucket_size == 0 {
            return Err(PsiError::Config(String::from("bucket_size must be positive")));
        }
        if let Some(p) = self.protocol.dp_params() {
            p.validate()?;
        }
        if let Some(input) = &self.input {
            if input.select_fields.is_empty() {
                return Err(PsiError::Config(String::from("select_fields is empty")));
            }
            let mut fields = input.select_fields.clone();
            fields.sort_unstable();
            fields.dedup();
            if fields.len() != input.select_fields.len() {
                return Err(PsiError::Config(format!(
                    "select_fields has duplicates: {:?}",
                    input.select_fields
                )));
            }
        }
        Ok(())
    }

    /// Checks against the session the run happens in
    pub fn validate_for_world(&self, world_size: usize) -> Result<(), PsiError> {
        self.validate()?;
        if world_size != self.protocol.world_size() {
            return Err(PsiError::Config(format!(
                "{} runs between {} parties, the link has {}",
                self.protocol.name(),
                self.protocol.world_size(),
                world_size
            )));
        }
        if let Some(r) = self.receiver_rank {
            if r >= world_size {
                return Err(PsiError::Config(format!(
                    "receiver_rank {} out of range for {} parties",
                    r, world_size
                )));
            }
        }
        Ok(())
    }
}

pub struct PsiConfigBuilder {
    config: PsiConfig,
}

impl PsiConfigBuilder {
    pub fn broadcast_result(mut self, broadcast: bool) -> Self {
        self.config.broadcast_result = broadcast;
        self
    }

    pub fn receiver_rank(mut self, rank: usize) -> Self {
        self.config.receiver_rank = Some(rank);
        self
    }

    pub fn curve(mut self, curve: CurveType) -> Self {
        self.config.curve = curve;
        self
    }

    pub fn input(mut self, path: &str, select_fields: &[&str]) -> Self {
        self.config.input = Some(InputParams {
            path: String::from(path),
            select_fields: select_fields.iter().map(|s| String::from(*s)).collect(),
        });
        self
    }

    pub fn output(mut self, path: &str, need_sort: bool) -> Self {
        self.config.output = Some(OutputParams {
            path: String::from(path),
            need_sort,
        });
        self
    }

    pub fn bucket_size(mut self, bucket_size: usize) -> Self {
        self.config.bucket_size = bucket_size;
        self
    }

    pub fn build(self) -> Result<PsiConfig, PsiError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
