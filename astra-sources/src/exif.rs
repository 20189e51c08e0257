//! Local adapter for pre-extracted image metadata
//!
//! No network: the analysis backend already pulled the fields out of the
//! image, this adapter only turns them into signals.

use async_trait::async_trait;
use astra_core::{
    ids, CameraFingerprint, CaptureTime, EditHistory, ExifBundle, Failure, GpsFix, Signal,
    SignalPayload, SourceOutcome, Subject, SubjectKind,
};

use crate::{unsupported, SourceAdapter};

/// Software names that indicate the image was edited after capture
const EDITING_SOFTWARE: &[&str] = &[
    "photoshop",
    "lightroom",
    "gimp",
    "affinity",
    "pixelmator",
    "snapseed",
    "paint.net",
    "canva",
    "picsart",
    "facetune",
];

/// Whether a `Software` value names an image editor
pub fn is_editing_software(software: &str) -> bool {
    let lower = software.to_lowercase();
    EDITING_SOFTWARE.iter().any(|editor| lower.contains(editor))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExifAdapter;

impl ExifAdapter {
    pub const ACCEPTS: &'static [SubjectKind] = &[SubjectKind::ImageMetadata];

    pub fn new() -> Self {
        Self
    }

    /// Turn a bundle into signals; an empty bundle is `NotFound`
    pub fn decode(bundle: &ExifBundle) -> SourceOutcome {
        let mut payloads = Vec::new();

        if bundle.has_camera() || bundle.lens.is_some() {
            payloads.push(SignalPayload::ExifCamera(CameraFingerprint {
                make: bundle.camera_make.clone(),
                model: bundle.camera_model.clone(),
                lens: bundle.lens.clone(),
                serial_present: bundle.serial_number.is_some(),
            }));
        }

        if let (Some(latitude), Some(longitude)) = (bundle.gps_latitude, bundle.gps_longitude) {
            payloads.push(SignalPayload::ExifGps(GpsFix {
                latitude,
                longitude,
                altitude: bundle.gps_altitude,
            }));
        }

        if let Some(raw) = &bundle.capture_time {
            payloads.push(SignalPayload::ExifCaptureTime(CaptureTime::from_exif(raw)));
        }

        let edited_by_software = bundle
            .software
            .as_deref()
            .is_some_and(is_editing_software);
        if edited_by_software || !bundle.edit_history.is_empty() {
            payloads.push(SignalPayload::ExifEditHistory(EditHistory {
                software: bundle.software.clone(),
                edits: bundle.edit_history.clone(),
            }));
        }

        if payloads.is_empty() {
            return Failure::not_found("no identifying metadata").into();
        }

        SourceOutcome::Signals(
            payloads
                .into_iter()
                .map(|payload| Signal::builder(payload).source(ids::EXIF).build())
                .collect(),
        )
    }
}

#[async_trait]
impl SourceAdapter for ExifAdapter {
    fn id(&self) -> &str {
        ids::EXIF
    }

    fn accepts(&self, kind: SubjectKind) -> bool {
        Self::ACCEPTS.contains(&kind)
    }

    async fn fetch(&self, subject: &Subject) -> SourceOutcome {
        match subject.as_metadata() {
            Some(bundle) => Self::decode(bundle),
            None => unsupported(self.id(), subject),
        }
    }
}
