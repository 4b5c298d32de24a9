//! Application progress shared by the wizard screens.
//!
//! Created by the host at startup and passed explicitly to whatever needs
//! it; the capture session writes its confirmed results here.

use crate::encode::EncodedImage;
use crate::flow::CaptureResult;
use crate::types::DocumentKind;
use anyhow::{Context, Result};
use serde::Serialize;

/// Applicant answers collected across the wizard, kept as entered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationData {
    pub title: String,
    pub first_name: String,
    pub last_name: String,
    pub mobile: String,
    pub email: String,
    pub dob: String,
    pub employer: String,
    pub nationality: String,
    pub occupation_type: String,
    pub resident_status: String,
    pub income: String,
    pub aecb_score: String,
    pub property_value: String,
    pub previous_mortgage: String,
    pub property_location: String,
    pub property_type: String,
    pub relationship_type: String,
    pub rate_type: String,
    pub product_type: String,
    pub loan_type: String,
    pub loan_amount: String,
    pub outstanding_amount: String,
    pub equity_amount: String,
}

impl Default for ApplicationData {
    fn default() -> Self {
        Self {
            title: "Mr".into(),
            first_name: String::new(),
            last_name: String::new(),
            mobile: String::new(),
            email: String::new(),
            dob: String::new(),
            employer: String::new(),
            nationality: "UAE".into(),
            occupation_type: "salaried".into(),
            resident_status: "resident".into(),
            income: String::new(),
            aecb_score: "750".into(),
            property_value: String::new(),
            previous_mortgage: "no".into(),
            property_location: "Dubai".into(),
            property_type: "apartment".into(),
            relationship_type: "personal".into(),
            rate_type: "fixed".into(),
            product_type: "standard".into(),
            loan_type: "purchase".into(),
            loan_amount: String::new(),
            outstanding_amount: "0".into(),
            equity_amount: String::new(),
        }
    }
}

/// Confirmed KYC images.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycDocuments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_front: Option<EncodedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_back: Option<EncodedImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face: Option<EncodedImage>,
}

impl KycDocuments {
    pub fn is_complete(&self) -> bool {
        self.id_front.is_some() && self.face.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationContext {
    application_data: ApplicationData,
    documents: KycDocuments,
}

impl ApplicationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &ApplicationData {
        &self.application_data
    }

    pub fn update(&mut self, edit: impl FnOnce(&mut ApplicationData)) {
        edit(&mut self.application_data);
    }

    pub fn reset(&mut self) {
        tracing::debug!("Resetting application context");
        *self = Self::default();
    }

    pub fn documents(&self) -> &KycDocuments {
        &self.documents
    }

    /// Store a confirmed capture. A single-shot ID fills the front only and
    /// clears any stale back side.
    pub fn record_capture(&mut self, kind: DocumentKind, result: CaptureResult) {
        match (kind, result) {
            (DocumentKind::Face, CaptureResult::Single(image)) => {
                self.documents.face = Some(image);
            }
            (DocumentKind::Face, CaptureResult::FrontBack { front, .. }) => {
                tracing::warn!("Face capture returned two sides, keeping the first");
                self.documents.face = Some(front);
            }
            (DocumentKind::IdentityDocument, CaptureResult::Single(image)) => {
                self.documents.id_front = Some(image);
                self.documents.id_back = None;
            }
            (DocumentKind::IdentityDocument, CaptureResult::FrontBack { front, back }) => {
                self.documents.id_front = Some(front);
                self.documents.id_back = Some(back);
            }
        }
        tracing::info!("Recorded {:?} capture", kind);
    }

    /// JSON upload body, images embedded as data URIs.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize application context")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still(tag: u8) -> EncodedImage {
        EncodedImage {
            width: 2,
            height: 2,
            data: vec![tag; 4],
        }
    }

    #[test]
    fn starts_with_wizard_defaults() {
        let context = ApplicationContext::new();
        assert_eq!(context.data().title, "Mr");
        assert_eq!(context.data().aecb_score, "750");
        assert_eq!(context.data().outstanding_amount, "0");
        assert!(!context.documents().is_complete());
    }

    #[test]
    fn update_then_reset() {
        let mut context = ApplicationContext::new();
        context.update(|data| {
            data.first_name = "Layla".into();
            data.loan_amount = "1200000".into();
        });
        assert_eq!(context.data().first_name, "Layla");

        context.record_capture(DocumentKind::Face, CaptureResult::Single(still(1)));
        context.reset();
        assert_eq!(context, ApplicationContext::default());
    }

    #[test]
    fn front_back_capture_fills_both_sides() {
        let mut context = ApplicationContext::new();
        context.record_capture(
            DocumentKind::IdentityDocument,
            CaptureResult::FrontBack {
                front: still(1),
                back: still(2),
            },
        );
        context.record_capture(DocumentKind::Face, CaptureResult::Single(still(3)));

        assert_eq!(context.documents().id_back, Some(still(2)));
        assert!(context.documents().is_complete());

        context.record_capture(DocumentKind::IdentityDocument, CaptureResult::Single(still(4)));
        assert_eq!(context.documents().id_front, Some(still(4)));
        assert!(context.documents().id_back.is_none());
    }

    #[test]
    fn json_embeds_data_uris() {
        let mut context = ApplicationContext::new();
        context.record_capture(DocumentKind::Face, CaptureResult::Single(still(7)));

        let json: serde_json::Value = serde_json::from_str(&context.to_json().unwrap()).unwrap();
        let face = json["documents"]["face"].as_str().unwrap();
        assert!(face.starts_with("data:image/jpeg;base64,"));
        assert!(json["documents"].get("idFront").is_none());
        assert_eq!(json["applicationData"]["firstName"], "");
    }
}
