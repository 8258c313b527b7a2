//! Preview notification email composition

use chrono::{DateTime, FixedOffset, Offset, SecondsFormat, Utc};
use reqwest::Url;
use std::net::IpAddr;

const UNKNOWN: &str = "unknown";

/// Normalize a video URL, accepting only absolute http(s) URLs
pub fn parse_video_url(value: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    let url = Url::parse(value).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

/// Escape text for interpolation into HTML
pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Visitor address: first `X-Forwarded-For` entry, else the peer address
pub fn client_ip(forwarded_for: Option<&str>, peer: Option<IpAddr>) -> String {
    forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// What is known about one preview page visit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitDetails {
    pub video_url: String,
    pub ip: String,
    pub user_agent: String,
    pub referer: String,
}

impl VisitDetails {
    /// Absent headers are reported as `unknown`
    pub fn new(
        video_url: impl Into<String>,
        ip: impl Into<String>,
        user_agent: Option<&str>,
        referer: Option<&str>,
    ) -> Self {
        let or_unknown = |v: Option<&str>| {
            v.filter(|s| !s.is_empty())
                .unwrap_or(UNKNOWN)
                .to_string()
        };
        Self {
            video_url: video_url.into(),
            ip: ip.into(),
            user_agent: or_unknown(user_agent),
            referer: or_unknown(referer),
        }
    }
}

/// A rendered notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

fn offset_label(hours: i32) -> String {
    if hours >= 0 {
        format!("UTC+{}", hours)
    } else {
        format!("UTC{}", hours)
    }
}

fn html_section(title: &str, rows: &[(&str, String)]) -> String {
    let mut out = String::from(
        "<div style=\"border:1px solid #e5e7eb;border-radius:10px;padding:12px 14px;margin-bottom:12px;\">",
    );
    out.push_str(&format!(
        "<div style=\"font-weight:600;margin-bottom:8px;\">{}</div>",
        title
    ));
    for (label, value) in rows {
        out.push_str(&format!("<div><strong>{}:</strong> {}</div>", label, value));
    }
    out.push_str("</div>");
    out
}

/// Render the subject, plain text and HTML bodies
pub fn compose(
    visit: &VisitDetails,
    visited_at: DateTime<Utc>,
    utc_offset_hours: i32,
    app_base_url: &str,
) -> NotificationEmail {
    let offset = FixedOffset::east_opt(utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix());
    let local = visited_at
        .with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();
    let iso = visited_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let zone = offset_label(utc_offset_hours);
    let app_base_url = if app_base_url.is_empty() {
        UNKNOWN
    } else {
        app_base_url
    };

    let subject = format!("[Video preview] Someone opened the player page ({})", local);

    let text = [
        "Video preview visit".to_string(),
        "===================".to_string(),
        String::new(),
        "[Visit]".to_string(),
        format!("- Time ({}): {}", zone, local),
        format!("- Time (UTC): {}", iso),
        format!("- Video URL: {}", visit.video_url),
        String::new(),
        "[Visitor]".to_string(),
        format!("- IP: {}", visit.ip),
        format!("- User-Agent: {}", visit.user_agent),
        String::new(),
        "[Source]".to_string(),
        format!("- Referer: {}", visit.referer),
        format!("- Site: {}", app_base_url),
    ]
    .join("\n");

    let video = escape_html(&visit.video_url);
    let time_label = format!("Time ({})", zone);
    let html = format!(
        "<div style=\"font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;line-height:1.6;color:#1f2937;\">\
         <h2 style=\"margin:0 0 12px;\">Video preview visit</h2>\
         <p style=\"margin:0 0 16px;color:#4b5563;\">Someone opened the video preview player page.</p>\
         {}{}{}</div>",
        html_section(
            "Visit",
            &[
                (time_label.as_str(), escape_html(&local)),
                ("Time (UTC)", escape_html(&iso)),
                ("Video URL", format!("<a href=\"{}\">{}</a>", video, video)),
            ]
        ),
        html_section(
            "Visitor",
            &[
                ("IP", escape_html(&visit.ip)),
                ("User-Agent", escape_html(&visit.user_agent)),
            ]
        ),
        html_section(
            "Source",
            &[
                ("Referer", escape_html(&visit.referer)),
                ("Site", escape_html(app_base_url)),
            ]
        ),
    );

    NotificationEmail {
        subject,
        text,
        html,
    }
}
