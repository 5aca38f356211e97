#![forbid(unsafe_code)]

/// Per-job output link. Links are append-only: once a link has a row id the
/// store never rewrites it.
#[derive(Clone, Debug, PartialEq)]
pub struct JobLink {
    pub id: Option<i64>,
    pub href: String,
    pub title: Option<String>,
    pub link_type: Option<String>,
    pub rel: Option<String>,
    pub bbox: Option<[f64; 4]>,
    pub temporal_start_ms: Option<i64>,
    pub temporal_end_ms: Option<i64>,
}

pub const STAGING_BUCKET_REL: &str = "s3-access";

impl JobLink {
    pub fn new(href: impl Into<String>, rel: impl Into<String>) -> Self {
        Self {
            id: None,
            href: href.into(),
            title: None,
            link_type: None,
            rel: Some(rel.into()),
            bbox: None,
            temporal_start_ms: None,
            temporal_end_ms: None,
        }
    }

    /// Link to the staging area the service workers wrote results into.
    pub fn staging_bucket(location: impl Into<String>) -> Self {
        let mut link = Self::new(location, STAGING_BUCKET_REL);
        link.title = Some("Results in staging bucket".to_string());
        link
    }

    pub fn is_staging_bucket(&self) -> bool {
        self.rel.as_deref() == Some(STAGING_BUCKET_REL)
    }

    pub fn has_spatio_temporal(&self) -> bool {
        self.bbox.is_some() || self.temporal_start_ms.is_some() || self.temporal_end_ms.is_some()
    }
}
