// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report identifiers.

use crate::aggregate::ReportMetadata;
use newtype_uuid::{TypedUuid, TypedUuidKind, TypedUuidTag};
use xxhash_rust::xxh3::xxh3_128;

/// The kind for report UUIDs.
pub enum ReportKind {}

impl TypedUuidKind for ReportKind {
    fn tag() -> TypedUuidTag {
        const TAG: TypedUuidTag = TypedUuidTag::new("flakeguard_report");
        TAG
    }
}

/// A UUID identifying the outputs of a single aggregation run.
pub type ReportUuid = TypedUuid<ReportKind>;

/// Returns the ID to use for a report.
///
/// A non-empty `supplied` ID is used as is. Otherwise an ID is generated: if `metadata` names a
/// head commit, the ID is derived from all of the metadata (repository, branch, commits and
/// workflow), so rerunning aggregation for the same workflow run produces the same ID. If not, a
/// random ID is used.
pub fn resolve_report_id(supplied: Option<&str>, metadata: &ReportMetadata) -> String {
    if let Some(supplied) = supplied.map(str::trim).filter(|id| !id.is_empty()) {
        return supplied.to_owned();
    }

    match stable_report_uuid(metadata) {
        Some(uuid) => uuid.to_string(),
        None => ReportUuid::new_v4().to_string(),
    }
}

fn stable_report_uuid(metadata: &ReportMetadata) -> Option<ReportUuid> {
    let head_sha = metadata.head_sha.as_deref()?;
    let mut input = Vec::new();
    for part in [
        metadata.repo_url.as_deref().unwrap_or_default(),
        metadata.branch_name.as_deref().unwrap_or_default(),
        head_sha,
        metadata.base_sha.as_deref().unwrap_or_default(),
        metadata.github_workflow_name.as_deref().unwrap_or_default(),
        metadata.github_workflow_run_url.as_deref().unwrap_or_default(),
    ] {
        input.extend_from_slice(part.as_bytes());
        input.push(0);
    }
    Some(ReportUuid::from_u128(xxh3_128(&input)))
}
