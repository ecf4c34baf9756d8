//! Stage message selection and rendering.

use akuflow_core::types::{EmailTag, OutboundEmail, RetentionStage};

use crate::personalize::{Candidate, StageContext};

/// Which copy a candidate gets. One variant per branch of each stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageVariant {
    Day1NotStarted,
    Day1Started,
    Day3NoProgress,
    Day3Progress { completed_modules: u32, current_streak: u32 },
    Day7Active { completed_modules: u32 },
    Day7Lapsed { completed_modules: u32, days_since_last_activity: i64 },
}

/// Day-7 learners seen within this many days get the celebratory copy.
const DAY7_ACTIVE_WITHIN_DAYS: i64 = 3;

impl MessageVariant {
    pub fn select(context: &StageContext) -> Self {
        match *context {
            StageContext::Day1 { has_activity: false } => Self::Day1NotStarted,
            StageContext::Day1 { has_activity: true } => Self::Day1Started,
            StageContext::Day3 { completed_modules: 0, .. } => Self::Day3NoProgress,
            StageContext::Day3 { completed_modules, current_streak } => Self::Day3Progress {
                completed_modules,
                current_streak,
            },
            StageContext::Day7 { completed_modules, days_since_last_activity }
                if days_since_last_activity <= DAY7_ACTIVE_WITHIN_DAYS =>
            {
                Self::Day7Active { completed_modules }
            }
            StageContext::Day7 { completed_modules, days_since_last_activity } => Self::Day7Lapsed {
                completed_modules,
                days_since_last_activity,
            },
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::Day1NotStarted => "Ready to start your AI journey?".into(),
            Self::Day1Started => "Great start! Keep the momentum going".into(),
            Self::Day3NoProgress => "Your learning path is waiting".into(),
            Self::Day3Progress { completed_modules, .. } => {
                format!("You've completed {} — keep going!", modules(*completed_modules))
            }
            Self::Day7Active { .. } => "One week in — look how far you've come".into(),
            Self::Day7Lapsed { .. } => "We miss you — your next module is ready".into(),
        }
    }

    /// Plain-text paragraphs; the HTML body wraps the same copy.
    fn paragraphs(&self, name: &str) -> Vec<String> {
        match self {
            Self::Day1NotStarted => vec![
                format!("Hi {name},"),
                "Welcome aboard! Your first module takes about ten minutes, and it's the fastest way to see what AI can do for you.".into(),
            ],
            Self::Day1Started => vec![
                format!("Hi {name},"),
                "You've already started learning, nice work. Learners who come back on day two are far more likely to finish their path.".into(),
            ],
            Self::Day3NoProgress => vec![
                format!("Hi {name},"),
                "Your personalized learning path is ready whenever you are. Start with one short module today.".into(),
            ],
            Self::Day3Progress { completed_modules, current_streak } => {
                let mut lines = vec![
                    format!("Hi {name},"),
                    format!("In three days you've completed {}.", modules(*completed_modules)),
                ];
                if *current_streak > 1 {
                    lines.push(format!(
                        "You're on a {current_streak}-day streak. Don't break the chain!"
                    ));
                }
                lines
            }
            Self::Day7Active { completed_modules } => vec![
                format!("Hi {name},"),
                format!(
                    "It's been a week and you've completed {}. Your certificate is getting closer.",
                    modules(*completed_modules)
                ),
            ],
            Self::Day7Lapsed { completed_modules, days_since_last_activity } => {
                let mut lines = vec![
                    format!("Hi {name},"),
                    format!("It's been {days_since_last_activity} days since we last saw you."),
                ];
                if *completed_modules > 0 {
                    lines.push(format!(
                        "You've already completed {}, so pick up right where you left off.",
                        modules(*completed_modules)
                    ));
                } else {
                    lines.push("Your first module is still waiting, and it only takes a few minutes.".into());
                }
                lines
            }
        }
    }
}

fn modules(n: u32) -> String {
    if n == 1 {
        "1 module".into()
    } else {
        format!("{n} modules")
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Provider tags: `type` groups by stage, `sequence` orders the series.
pub fn stage_tags(stage: RetentionStage) -> Vec<EmailTag> {
    vec![
        EmailTag {
            name: "type".into(),
            value: format!("retention_{}", stage.as_str()),
        },
        EmailTag {
            name: "sequence".into(),
            value: stage.days_since_signup().to_string(),
        },
    ]
}

/// Render the message a candidate should receive.
pub fn render(candidate: &Candidate, app_url: &str) -> OutboundEmail {
    let variant = MessageVariant::select(&candidate.context);
    let name = candidate.user.greeting_name();
    let link = format!("{}/dashboard", app_url.trim_end_matches('/'));
    let paragraphs = variant.paragraphs(name);

    let mut text = paragraphs.join("\n\n");
    text.push_str(&format!("\n\nContinue learning: {link}\n\nThe Akuflow team"));

    let body: String = paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", escape_html(p)))
        .collect();
    let html = format!(
        "<!DOCTYPE html><html><body>{body}<p><a href=\"{href}\">Continue learning</a></p><p>The Akuflow team</p></body></html>",
        href = escape_html(&link)
    );

    OutboundEmail {
        to: candidate.user.email.clone(),
        subject: variant.subject(),
        html,
        text,
        tags: stage_tags(candidate.context.stage()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use akuflow_core::types::User;
    use chrono::Utc;

    fn candidate(context: StageContext) -> Candidate {
        Candidate {
            user: User {
                id: "u1".into(),
                email: "ada@example.com".into(),
                display_name: Some("Ada <script>".into()),
                signed_up_at: Utc::now(),
            },
            context,
        }
    }

    #[test]
    fn test_day1_subject_table() {
        let table = [
            (false, "Ready to start your AI journey?"),
            (true, "Great start!"),
        ];
        for (has_activity, expected) in table {
            let email = render(&candidate(StageContext::Day1 { has_activity }), "https://app.test");
            assert!(
                email.subject.contains(expected),
                "has_activity={has_activity} → {:?}",
                email.subject
            );
        }
        let not_started = render(&candidate(StageContext::Day1 { has_activity: false }), "x");
        assert_eq!(not_started.subject, "Ready to start your AI journey?");
    }

    #[test]
    fn test_variant_selection() {
        assert_eq!(
            MessageVariant::select(&StageContext::Day3 { completed_modules: 0, current_streak: 5 }),
            MessageVariant::Day3NoProgress
        );
        assert_eq!(
            MessageVariant::select(&StageContext::Day7 { completed_modules: 2, days_since_last_activity: 3 }),
            MessageVariant::Day7Active { completed_modules: 2 }
        );
        assert!(matches!(
            MessageVariant::select(&StageContext::Day7 { completed_modules: 2, days_since_last_activity: 4 }),
            MessageVariant::Day7Lapsed { .. }
        ));
    }

    #[test]
    fn test_day3_subject_counts_modules() {
        let one = render(
            &candidate(StageContext::Day3 { completed_modules: 1, current_streak: 1 }),
            "https://app.test",
        );
        assert_eq!(one.subject, "You've completed 1 module — keep going!");
        let three = render(
            &candidate(StageContext::Day3 { completed_modules: 3, current_streak: 3 }),
            "https://app.test",
        );
        assert!(three.text.contains("3-day streak"));
    }

    #[test]
    fn test_render_escapes_and_tags() {
        let email = render(
            &candidate(StageContext::Day7 { completed_modules: 0, days_since_last_activity: 7 }),
            "https://app.test/",
        );
        assert_eq!(email.to, "ada@example.com");
        assert!(email.html.contains("Ada &lt;script&gt;"));
        assert!(!email.html.contains("<script>"));
        assert!(email.text.contains("https://app.test/dashboard"));
        assert_eq!(email.tags[0].value, "retention_day7");
        assert_eq!(email.tags[1].value, "7");
    }
}
