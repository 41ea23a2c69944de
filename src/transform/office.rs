//! Office document → PDF through the external conversion engine.

use crate::artifact::{ArtifactRef, MediaKind};
use crate::engine::ConversionEngine;
use crate::error::DocforgeError;
use crate::store::ArtifactStore;
use tracing::info;

/// Convert `input` with `engine` and move the result into the outbound area
/// as `<stem>.pdf`.
///
/// The engine writes into a scratch directory private to this call, so
/// concurrent conversions of same-named files never see each other's output.
/// The scratch directory (with any lock or profile files the engine left) is
/// removed on return.
pub async fn office_to_document(
    store: &ArtifactStore,
    engine: &ConversionEngine,
    input: &ArtifactRef,
) -> Result<Vec<ArtifactRef>, DocforgeError> {
    let scratch = store.scratch_dir("engine")?;
    let produced = engine.convert(&input.path, scratch.path()).await?;

    let output = store.adopt(
        &produced,
        "office",
        format!("{}.pdf", input.stem()),
        MediaKind::Pdf,
    )?;
    info!(
        "Converted '{}' → '{}'",
        input.original_name, output.original_name
    );
    Ok(vec![output])
}
