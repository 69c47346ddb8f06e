//! in-toto v1 statements for rebuild provenance and verdicts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::pipeline::VerdictRecord;
use crate::rebuild::RebuildInput;
use crate::remote::BuildInfo;

pub const IN_TOTO_STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v1";
pub const SLSA_PROVENANCE_PREDICATE_TYPE: &str = "https://slsa.dev/provenance/v1";
pub const VERDICT_PREDICATE_TYPE: &str = "https://rebuild-lane.dev/verdict/v1";

const BUILD_TYPE: &str = "https://rebuild-lane.dev/build/remote/v1";

/// Compute SHA-256 hash of data and return as hex string
pub fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InTotoStatement {
    #[serde(rename = "_type")]
    pub statement_type: String,
    pub subject: Vec<InTotoSubject>,
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    pub predicate: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InTotoSubject {
    pub name: String,
    pub digest: BTreeMap<String, String>,
}

/// Name and SHA-256 of one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDigest {
    pub name: String,
    pub sha256: String,
}

impl ArtifactDigest {
    pub fn of(name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            name: name.into(),
            sha256: compute_sha256(bytes),
        }
    }

    fn subject(&self) -> InTotoSubject {
        InTotoSubject {
            name: self.name.clone(),
            digest: BTreeMap::from([("sha256".to_string(), self.sha256.clone())]),
        }
    }
}

impl InTotoStatement {
    fn new(subject: Vec<InTotoSubject>, predicate_type: &str, predicate: serde_json::Value) -> Self {
        Self {
            statement_type: IN_TOTO_STATEMENT_TYPE.to_string(),
            subject,
            predicate_type: predicate_type.to_string(),
            predicate,
        }
    }
}

/// SLSA provenance for the rebuilt artifact.
pub fn build_provenance_statement(
    info: &BuildInfo,
    input: &RebuildInput,
    rebuilt: &ArtifactDigest,
) -> InTotoStatement {
    let dependencies: Vec<_> = info
        .build_images
        .iter()
        .map(|(step, image)| {
            let mut digest = serde_json::Map::new();
            if let Some((alg, value)) = image.split_once(':') {
                digest.insert(alg.to_string(), json!(value));
            }
            json!({"name": step, "uri": image, "digest": digest})
        })
        .collect();

    let predicate = json!({
        "buildDefinition": {
            "buildType": BUILD_TYPE,
            "externalParameters": {
                "ecosystem": input.target.ecosystem(),
                "package": input.target.package(),
                "version": input.target.version(),
                "artifact": input.target.artifact(),
                "source": {
                    "repository": input.location.repo,
                    "ref": input.location.git_ref,
                    "dir": input.location.dir,
                },
                "strategy": input.strategy,
            },
            "internalParameters": {
                "instructions": input.instructions,
                "steps": info.steps,
            },
            "resolvedDependencies": dependencies,
        },
        "runDetails": {
            "builder": {"id": info.builder},
            "metadata": {
                "invocationId": info.id,
                "buildId": info.build_id,
                "startedOn": info.build_start.to_rfc3339(),
                "finishedOn": info.build_end.to_rfc3339(),
            },
        },
    });
    InTotoStatement::new(vec![rebuilt.subject()], SLSA_PROVENANCE_PREDICATE_TYPE, predicate)
}

/// Verdict of comparing `rebuilt` against `upstream`.
pub fn verdict_statement(
    record: &VerdictRecord,
    rebuilt: &ArtifactDigest,
    upstream: &ArtifactDigest,
) -> InTotoStatement {
    let predicate = json!({
        "target": {
            "ecosystem": record.target.ecosystem(),
            "package": record.target.package(),
            "version": record.target.version(),
            "artifact": record.target.artifact(),
        },
        "reproduced": record.is_reproduced(),
        "verdict": record.kind.map(|k| k.code()),
        "message": record.message,
        "upstream": {
            "name": upstream.name,
            "digest": {"sha256": upstream.sha256},
        },
    });
    InTotoStatement::new(vec![rebuilt.subject()], VERDICT_PREDICATE_TYPE, predicate)
}
