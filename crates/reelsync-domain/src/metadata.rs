// SPDX-License-Identifier: GPL-3.0-or-later

//! Upstream metadata access.
//!
//! Indexers return an untyped JSON object per media item. Each source type has a
//! [`MetadataSchema`] mapping the logical fields the rest of the system cares
//! about onto the upstream key names. The schema is resolved once per source
//! type and then handed to a [`MediaMetadata`] view.

use chrono::NaiveDate;
use serde_json::{Map, Value};

/// Logical metadata fields, independent of which upstream produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataField {
    Key,
    UploadDate,
    Title,
    Thumbnail,
    Description,
    Duration,
    Formats,
}

/// Upstream key names for each [`MetadataField`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSchema {
    pub key: &'static str,
    pub upload_date: &'static str,
    pub title: &'static str,
    pub thumbnail: &'static str,
    pub description: &'static str,
    pub duration: &'static str,
    pub formats: &'static str,
}

impl MetadataSchema {
    pub const fn field(&self, field: MetadataField) -> &'static str {
        match field {
            MetadataField::Key => self.key,
            MetadataField::UploadDate => self.upload_date,
            MetadataField::Title => self.title,
            MetadataField::Thumbnail => self.thumbnail,
            MetadataField::Description => self.description,
            MetadataField::Duration => self.duration,
            MetadataField::Formats => self.formats,
        }
    }
}

/// Schema shared by YouTube channels and playlists.
pub const YOUTUBE_SCHEMA: MetadataSchema = MetadataSchema {
    key: "id",
    upload_date: "upload_date",
    title: "title",
    thumbnail: "thumbnail",
    description: "description",
    duration: "duration",
    formats: "formats",
};

/// Read-only view over one media item's raw metadata.
#[derive(Debug, Clone)]
pub struct MediaMetadata {
    value: Value,
    schema: &'static MetadataSchema,
}

impl MediaMetadata {
    /// Parse a stored metadata blob. Missing or malformed JSON degrades to an
    /// empty object so every accessor falls back to its empty value.
    pub fn parse(raw: Option<&str>, schema: &'static MetadataSchema) -> Self {
        let value = raw
            .and_then(|text| serde_json::from_str::<Value>(text).ok())
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Map::new()));
        Self { value, schema }
    }

    pub fn from_value(value: Value, schema: &'static MetadataSchema) -> Self {
        let value = if value.is_object() {
            value
        } else {
            Value::Object(Map::new())
        };
        Self { value, schema }
    }

    pub fn schema(&self) -> &'static MetadataSchema {
        self.schema
    }

    pub fn raw(&self) -> &Value {
        &self.value
    }

    fn get(&self, field: MetadataField) -> Option<&Value> {
        self.value.get(self.schema.field(field))
    }

    fn text(&self, field: MetadataField) -> String {
        self.get(field)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    /// The upstream item key. Numeric keys are rendered as strings.
    pub fn key(&self) -> Option<String> {
        match self.get(MetadataField::Key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn title(&self) -> String {
        self.text(MetadataField::Title)
    }

    pub fn description(&self) -> String {
        self.text(MetadataField::Description)
    }

    pub fn thumbnail(&self) -> String {
        self.text(MetadataField::Thumbnail)
    }

    /// Upload date in upstream `YYYYMMDD` form.
    pub fn upload_date(&self) -> Option<NaiveDate> {
        let raw = self.text(MetadataField::UploadDate);
        NaiveDate::parse_from_str(&raw, "%Y%m%d").ok()
    }

    /// Duration in whole seconds, 0 when unknown.
    pub fn duration(&self) -> u64 {
        match self.get(MetadataField::Duration) {
            Some(Value::Number(n)) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn duration_formatted(&self) -> String {
        match self.duration() {
            0 => "??:??:??".to_string(),
            seconds => format_duration(seconds),
        }
    }

    /// Raw format descriptors as reported upstream.
    pub fn formats(&self) -> &[Value] {
        self.get(MetadataField::Formats)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Render seconds as `HH:MM:SS`.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}
