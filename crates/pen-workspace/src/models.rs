//! Pen service wire types
//!
//! JSON bodies use camelCase keys. Every response is wrapped in
//! [`ApiResponse`].

use crate::error::{ServiceError, ValidationError};
use chrono::{DateTime, Utc};
use pen_preview::FragmentSet;
use serde::{Deserialize, Serialize};

/// Allowed title length in characters
pub const TITLE_LENGTH: std::ops::RangeInclusive<usize> = 3..=100;

/// Maximum description length in characters
pub const MAX_DESCRIPTION_LENGTH: usize = 10_000;

/// A saved pen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pen {
    /// Service-assigned id
    pub id: i64,
    /// Markup
    #[serde(default)]
    pub html: Option<String>,
    /// Style
    #[serde(default)]
    pub css: Option<String>,
    /// Script
    #[serde(default)]
    pub js: Option<String>,
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Version, bumped by migration
    #[serde(default)]
    pub version: u32,
    /// Author
    #[serde(default)]
    pub author_id: Option<String>,
    /// Entity status
    #[serde(default)]
    pub status: Option<String>,
    /// Creation time
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Pen {
    /// The pen's three fragments, missing ones empty
    #[must_use]
    pub fn fragments(&self) -> FragmentSet {
        FragmentSet::new(
            self.html.clone().unwrap_or_default(),
            self.css.clone().unwrap_or_default(),
            self.js.clone().unwrap_or_default(),
        )
    }
}

/// Body of a create request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePen {
    /// Markup
    pub html: Option<String>,
    /// Style
    pub css: Option<String>,
    /// Script
    pub js: Option<String>,
    /// Title, 3 to 100 characters
    pub title: String,
    /// Description, at most 10 000 characters
    pub description: Option<String>,
}

impl CreatePen {
    /// Create request from fragments
    #[must_use]
    pub fn from_fragments(fragments: &FragmentSet, title: impl Into<String>) -> Self {
        Self {
            html: Some(fragments.markup.clone()),
            css: Some(fragments.style.clone()),
            js: Some(fragments.script.clone()),
            title: title.into(),
            description: None,
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check field limits
    ///
    /// # Errors
    /// Returns `ValidationError` if the title or description is out of range
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_title(&self.title)?;
        validate_description(self.description.as_deref())
    }
}

/// Body of an update request; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePen {
    /// Markup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    /// Style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    /// Script
    #[serde(skip_serializing_if = "Option::is_none")]
    pub js: Option<String>,
    /// Title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UpdatePen {
    /// Update replacing all three fragments
    #[must_use]
    pub fn from_fragments(fragments: &FragmentSet) -> Self {
        Self {
            html: Some(fragments.markup.clone()),
            css: Some(fragments.style.clone()),
            js: Some(fragments.script.clone()),
            ..Self::default()
        }
    }

    /// Check field limits of the fields present
    ///
    /// # Errors
    /// Returns `ValidationError` if the title or description is out of range
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        validate_description(self.description.as_deref())
    }
}

fn validate_title(title: &str) -> Result<(), ValidationError> {
    let length = title.chars().count();
    if TITLE_LENGTH.contains(&length) {
        Ok(())
    } else {
        Err(ValidationError::TitleLength(length))
    }
}

fn validate_description(description: Option<&str>) -> Result<(), ValidationError> {
    let length = description.map_or(0, |text| text.chars().count());
    if length > MAX_DESCRIPTION_LENGTH {
        return Err(ValidationError::DescriptionTooLong(length));
    }
    Ok(())
}

/// Response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiResponse<T> {
    /// Payload
    #[serde(default)]
    pub data: Option<T>,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Whether the call succeeded
    pub success: bool,
    /// HTTP status echoed by the service
    #[serde(default)]
    pub status_code: u16,
    /// Field errors
    #[serde(default)]
    pub errors: Vec<String>,
}

impl<T> ApiResponse<T> {
    /// Unwrap the payload
    ///
    /// # Errors
    /// - `ServiceError::Rejected` if `success` is false
    /// - `ServiceError::MissingData` if the payload is absent
    pub fn into_data(self) -> Result<T, ServiceError> {
        self.into_result()?.ok_or(ServiceError::MissingData)
    }

    /// Check `success`, keeping an optional payload
    ///
    /// # Errors
    /// Returns `ServiceError::Rejected` if `success` is false
    pub fn into_result(self) -> Result<Option<T>, ServiceError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ServiceError::Rejected {
                message: self.message,
                errors: self.errors,
            })
        }
    }
}
