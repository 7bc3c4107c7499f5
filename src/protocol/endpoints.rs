//! Endpoint candidate resolution
//!
//! Candidates are URL templates resolved once at startup. `{station_id}` is
//! substituted into every template; templates mentioning `{deployment}` are
//! only kept when a deployment slug is available.

use std::fmt;
use url::Url;

pub const STATION_ID_PLACEHOLDER: &str = "{station_id}";
pub const DEPLOYMENT_PLACEHOLDER: &str = "{deployment}";

/// Default candidates, most-local first, durable public fallback last
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "ws://localhost:5000/rpi/{station_id}",
    "ws://0.0.0.0:5000/rpi/{station_id}",
    "wss://{deployment}.replit.app/rpi/{station_id}",
    "wss://xeryonremotedemostation.replit.app/rpi/{station_id}",
];

/// A fully-qualified WebSocket URL for one candidate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    url: String,
}

impl Endpoint {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Build the ordered candidate list for a station
pub fn resolve_endpoints<S: AsRef<str>>(
    station_id: &str,
    deployment: Option<&str>,
    templates: &[S],
) -> Vec<Endpoint> {
    templates
        .iter()
        .map(AsRef::as_ref)
        .filter_map(|template| render_template(template, station_id, deployment))
        .map(Endpoint::new)
        .collect()
}

fn render_template(template: &str, station_id: &str, deployment: Option<&str>) -> Option<String> {
    let rendered = template.replace(STATION_ID_PLACEHOLDER, station_id);
    if rendered.contains(DEPLOYMENT_PLACEHOLDER) {
        return deployment.map(|d| rendered.replace(DEPLOYMENT_PLACEHOLDER, d));
    }
    Some(rendered)
}

/// Check that a template yields a usable WebSocket URL
pub fn validate_template(template: &str) -> Result<(), String> {
    if !template.contains(STATION_ID_PLACEHOLDER) {
        return Err(format!(
            "'{template}' must contain the {STATION_ID_PLACEHOLDER} placeholder"
        ));
    }

    let sample = render_template(template, "station", Some("deployment"))
        .ok_or_else(|| format!("'{template}' could not be rendered"))?;
    let url = Url::parse(&sample).map_err(|e| format!("'{template}' is not a valid URL: {e}"))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(format!(
                "'{template}' uses scheme '{other}', expected ws or wss"
            ))
        }
    }
    if url.host_str().is_none() {
        return Err(format!("'{template}' has no host"));
    }

    Ok(())
}

/// Check that a deployment slug can stand as a single hostname label
///
/// The slug is spliced into a host name, so only ASCII letters, digits and
/// inner hyphens are accepted, at most 63 of them.
pub fn validate_deployment_slug(slug: &str) -> Result<(), String> {
    if slug.is_empty() || slug.len() > 63 {
        return Err(format!(
            "deployment slug '{slug}' must be 1 to 63 characters long"
        ));
    }
    if !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!(
            "deployment slug '{slug}' may only contain letters, digits and hyphens"
        ));
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err(format!(
            "deployment slug '{slug}' must not start or end with a hyphen"
        ));
    }
    Ok(())
}
