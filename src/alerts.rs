//! HTML rendering of policy notices and summary reports
//!
//! The policy engine decides *whether* to notify; this module decides what the
//! message looks like. Nothing here does I/O.

use chrono::{DateTime, Utc};

use crate::monitors::TrendReport;
use crate::monitors::provider::SERVICE_RUNNING;
use crate::policy::{Notice, NoticeKind};
use crate::summary::SummaryReport;
use crate::{Classification, ResourceKind};

/// Colours used for the header banner and accents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertStyle {
    pub accent: &'static str,
    pub background: &'static str,
    pub text: &'static str,
}

pub const WARNING_STYLE: AlertStyle = AlertStyle {
    accent: "#f0ad4e",
    background: "#fcf8e3",
    text: "#8a6d3b",
};

pub const CRITICAL_STYLE: AlertStyle = AlertStyle {
    accent: "#d9534f",
    background: "#f2dede",
    text: "#a94442",
};

pub const NORMAL_STYLE: AlertStyle = AlertStyle {
    accent: "#5cb85c",
    background: "#dff0d8",
    text: "#3c763d",
};

pub fn style_for(severity: Classification) -> AlertStyle {
    match severity {
        Classification::Normal => NORMAL_STYLE,
        Classification::Warning => WARNING_STYLE,
        Classification::Critical => CRITICAL_STYLE,
    }
}

/// Subject and body ready for [`NotificationDispatcher::send`](crate::notifications::NotificationDispatcher::send)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAlert {
    pub subject: String,
    pub html: String,
}

/// Per-monitor renderer; knows the thresholds and what is being watched
#[derive(Debug, Clone)]
pub struct AlertRenderer {
    kind: ResourceKind,
    hostname: String,
    warning_threshold: f64,
    critical_threshold: f64,

    /// Disk path or service name
    target: Option<String>,
}

impl AlertRenderer {
    pub fn new(
        kind: ResourceKind,
        hostname: impl Into<String>,
        warning_threshold: f64,
        critical_threshold: f64,
        target: Option<String>,
    ) -> Self {
        Self {
            kind,
            hostname: hostname.into(),
            warning_threshold,
            critical_threshold,
            target,
        }
    }

    pub fn subject(&self, notice: &Notice) -> String {
        let label = self.kind.label();
        match (&notice.reason, notice.severity) {
            (NoticeKind::Aggregated { .. }, _) => format!("{label} Warning Summary"),
            (NoticeKind::Recovered, _) | (_, Classification::Normal) => {
                format!("{label} Status Normalized")
            }
            (_, Classification::Critical) => format!("CRITICAL {label} Alert"),
            (_, Classification::Warning) => format!("{label} Warning"),
        }
    }

    pub fn render(&self, notice: &Notice, trend: &TrendReport) -> RenderedAlert {
        let style = style_for(notice.severity);
        let label = self.kind.label();

        let title = match &notice.reason {
            NoticeKind::Aggregated { .. } => format!("{} WARNING SUMMARY", label.to_uppercase()),
            NoticeKind::Recovered => format!("{} STATUS NORMALIZED", label.to_uppercase()),
            _ => format!(
                "{} {}",
                label.to_uppercase(),
                notice.severity.as_str().to_uppercase()
            ),
        };

        let mut rows = vec![
            ("Server".to_string(), escape_html(&self.hostname)),
            ("Time".to_string(), format_time(notice.reading.timestamp)),
        ];
        if let Some(target) = &self.target {
            let key = match self.kind {
                ResourceKind::Disk => "Path",
                _ => "Service",
            };
            rows.push((key.to_string(), escape_html(target)));
        }
        rows.push((
            format!("Current {label}"),
            self.format_value(notice.reading.value),
        ));
        if self.kind != ResourceKind::Service {
            rows.push((
                "Thresholds".to_string(),
                format!(
                    "warning {:.1}%, critical {:.1}%",
                    self.warning_threshold, self.critical_threshold
                ),
            ));
        }
        rows.push(("Status".to_string(), status_badge(notice.severity)));
        rows.push(("Trend".to_string(), trend.to_string()));

        let mut details = String::new();
        match &notice.reason {
            NoticeKind::StatusChange {
                previous: Some(previous),
            } => {
                details.push_str(&format!(
                    "<p>Status changed from <b>{previous}</b> to <b>{}</b>.</p>",
                    notice.severity
                ));
            }
            NoticeKind::StatusChange { previous: None } => {}
            NoticeKind::Escalation { consecutive } => {
                details.push_str(&format!(
                    "<p>{label} has stayed in warning for {consecutive} consecutive checks.</p>"
                ));
            }
            NoticeKind::CriticalRepeat { consecutive } => {
                details.push_str(&format!(
                    "<p>{label} has stayed critical for {consecutive} consecutive checks.</p>"
                ));
            }
            NoticeKind::Aggregated {
                count,
                since,
                until,
                peak,
            } => {
                let minutes = (*until - *since).num_minutes().max(1);
                details.push_str(&format!(
                    "<p><b>Aggregated Warning:</b> {count} warnings detected in the last {minutes} minutes.</p>"
                ));
                details.push_str(&format!(
                    "<p>Peak value during this period: <b>{}</b>.</p>",
                    self.format_value(*peak)
                ));
            }
            NoticeKind::Recovered => {
                details.push_str(&format!(
                    "<p>{label} is back to normal after a critical episode.</p>"
                ));
            }
        }

        match notice.severity {
            Classification::Critical => details.push_str(&format!(
                "<div style=\"background-color: {}; border-left: 5px solid {}; padding: 10px; margin: 10px 0;\">\
                 <p><b>IMMEDIATE ACTION REQUIRED.</b></p></div>",
                style.background, style.accent
            )),
            Classification::Warning => {
                details.push_str(
                    "<p><b>Recommendation:</b> Please monitor the system closely if this condition persists.</p>",
                );
                details.push_str(&format!(
                    "<p><small>This is warning notification {} of {} allowed per day.</small></p>",
                    notice.warnings_sent_today, notice.max_warnings_per_day
                ));
            }
            Classification::Normal => {}
        }

        RenderedAlert {
            subject: self.subject(notice),
            html: page(style, &title, &table(&rows), &details),
        }
    }

    pub fn render_summary(&self, report: &SummaryReport) -> RenderedAlert {
        let label = self.kind.label();
        let period = report.period_hours();

        let mut rows = vec![
            ("Server".to_string(), escape_html(&self.hostname)),
            ("Reporting Period".to_string(), format!("Last {period:.0} hours")),
            ("Warning Events".to_string(), report.warning_events.to_string()),
            ("Critical Events".to_string(), report.critical_events.to_string()),
        ];
        if let Some(peak) = report.peak {
            rows.push((format!("Peak {label}"), self.format_value(peak)));
        }
        for (name, time) in [
            ("Normal", report.normal_time),
            ("Warning", report.warning_time),
            ("Critical", report.critical_time),
        ] {
            rows.push((
                format!("Time in {name} State"),
                format!(
                    "{:.1}% ({:.1} hours)",
                    report.share(time),
                    time.num_seconds() as f64 / 3600.0
                ),
            ));
        }
        rows.push((format!("{label} Trend"), report.trend.to_string()));
        if let Some(current) = &report.current {
            rows.push((
                format!("Current {label} Status"),
                format!(
                    "{} ({})",
                    current.classification,
                    self.format_value(current.value)
                ),
            ));
        }

        let (severity, advice) = if report.critical_events > 5 || report.share(report.critical_time) > 10.0 {
            (
                Classification::Critical,
                "<p><b>URGENT ACTION RECOMMENDED:</b> multiple critical events or significant time spent in critical state.</p>",
            )
        } else if report.warning_events > 10 || report.share(report.warning_time) > 20.0 {
            (
                Classification::Warning,
                "<p><b>ACTION RECOMMENDED:</b> frequent warnings or significant time spent in warning state.</p>",
            )
        } else {
            (
                Classification::Normal,
                "<p><b>SYSTEM HEALTHY:</b> usage stayed within normal parameters during the reporting period.</p>",
            )
        };
        let advice_style = style_for(severity);
        let details = format!(
            "<p>This is an automated summary of {} activity during the reporting period.</p>\
             <div style=\"background-color: {}; border-left: 5px solid {}; padding: 10px; margin: 10px 0;\">{advice}</div>",
            label.to_lowercase(),
            advice_style.background,
            advice_style.accent,
        );

        RenderedAlert {
            subject: format!("{label} Usage Summary Report"),
            html: page(
                NORMAL_STYLE,
                &format!("{} USAGE SUMMARY REPORT", label.to_uppercase()),
                &table(&rows),
                &details,
            ),
        }
    }

    fn format_value(&self, value: f64) -> String {
        match self.kind {
            ResourceKind::Service if value == SERVICE_RUNNING => "running".to_string(),
            ResourceKind::Service => "stopped".to_string(),
            _ => format!("{value:.2}%"),
        }
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn status_badge(severity: Classification) -> String {
    let style = style_for(severity);
    format!(
        "<span style=\"color: {}; font-weight: bold;\">{}</span>",
        style.accent,
        severity.as_str().to_uppercase()
    )
}

fn table(rows: &[(String, String)]) -> String {
    let mut html = String::from(
        "<table style=\"border-collapse: collapse; width: 100%; margin: 10px 0;\">\n",
    );
    for (label, value) in rows {
        html.push_str(&format!(
            "<tr><th style=\"text-align: left; padding: 6px; border-bottom: 1px solid #ddd;\">{label}</th>\
             <td style=\"padding: 6px; border-bottom: 1px solid #ddd;\">{value}</td></tr>\n"
        ));
    }
    html.push_str("</table>");
    html
}

fn page(style: AlertStyle, title: &str, table: &str, details: &str) -> String {
    format!(
        "<!DOCTYPE html>\n\
         <html><body style=\"font-family: Arial, sans-serif; color: #333;\">\n\
         <div style=\"background-color: {accent}; color: white; padding: 12px; text-align: center;\">\
         <h2 style=\"margin: 0;\">{title}</h2></div>\n\
         {table}\n\
         {details}\n\
         <p style=\"color: {text}; font-size: 12px;\">Generated at {generated}</p>\n\
         </body></html>\n",
        accent = style.accent,
        text = style.text,
        generated = format_time(Utc::now()),
    )
}

/// Escape text for HTML element content
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
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
