//! Digest rendering.
//!
//! Rendering is a pure function of the gathered activity and the user's
//! tone, kept behind a trait so the worker's control flow and the text
//! generation concern stay independently testable.

use tessera_storage::{PendingReview, VoteActivity};
use tessera_types::{DigestTone, Proposal, VoteValue};

/// Everything the worker gathered for one user's window.
#[derive(Debug, Clone, Default)]
pub struct ActivitySummary {
    /// Pending-veto proposals, soonest deadline first.
    pub veto_alerts: Vec<PendingReview>,
    /// The agent's votes in the window, newest first.
    pub votes: Vec<VoteActivity>,
    /// Proposals created in the window, newest first.
    pub new_proposals: Vec<Proposal>,
}

impl ActivitySummary {
    /// True when all three activity sets are empty. Empty summaries are
    /// rendered (as the no-activity variant) but never persisted.
    pub fn is_empty(&self) -> bool {
        self.veto_alerts.is_empty() && self.votes.is_empty() && self.new_proposals.is_empty()
    }
}

/// Renders gathered activity into digest text.
pub trait DigestRenderer: Send + Sync {
    fn render(&self, tone: DigestTone, activity: &ActivitySummary) -> String;
}

/// Default section-based renderer: veto alerts first, then votes, then
/// new proposals, each section omitted entirely when empty.
#[derive(Default)]
pub struct TemplateRenderer;

impl TemplateRenderer {
    pub fn new() -> Self {
        Self
    }

    fn greeting(tone: DigestTone) -> &'static str {
        match tone {
            DigestTone::Friendly => "Hi there! Here's what your agent has been up to:",
            DigestTone::Formal => "Summary of delegated activity for this period:",
            DigestTone::Neutral => "Agent activity digest:",
        }
    }

    fn sign_off(tone: DigestTone) -> &'static str {
        match tone {
            DigestTone::Friendly => "Your agent keeps watch until the next digest!",
            DigestTone::Formal => "End of summary.",
            DigestTone::Neutral => "End of digest.",
        }
    }

    fn no_activity(tone: DigestTone) -> &'static str {
        match tone {
            DigestTone::Friendly => "All quiet! Your agent had nothing new to report this period.",
            DigestTone::Formal => "No delegated activity occurred in this period.",
            DigestTone::Neutral => "No activity this period.",
        }
    }

    fn vote_verb(value: VoteValue) -> &'static str {
        match value {
            VoteValue::Approve => "approved",
            VoteValue::Reject => "rejected",
            VoteValue::Abstain => "abstained on",
        }
    }
}

impl DigestRenderer for TemplateRenderer {
    fn render(&self, tone: DigestTone, activity: &ActivitySummary) -> String {
        if activity.is_empty() {
            return Self::no_activity(tone).to_string();
        }

        let mut out = String::new();
        out.push_str(Self::greeting(tone));
        out.push_str("\n");

        if !activity.veto_alerts.is_empty() {
            out.push_str("\n## Veto Window Alerts\n");
            for alert in &activity.veto_alerts {
                let deadline = alert
                    .proposal
                    .veto_window_end
                    .map(|end| end.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                out.push_str(&format!(
                    "- \"{}\": your agent {} this; override closes {}\n",
                    alert.proposal.title,
                    Self::vote_verb(alert.vote.value),
                    deadline
                ));
            }
        }

        if !activity.votes.is_empty() {
            out.push_str("\n## Recent Agent Votes\n");
            for item in &activity.votes {
                out.push_str(&format!(
                    "- {} \"{}\" (confidence {:.0}%)\n",
                    capitalize(Self::vote_verb(item.vote.value)),
                    item.proposal.title,
                    item.vote.confidence * 100.0
                ));
            }
        }

        if !activity.new_proposals.is_empty() {
            out.push_str("\n## New Proposals\n");
            for proposal in &activity.new_proposals {
                out.push_str(&format!("- \"{}\"\n", proposal.title));
            }
        }

        out.push_str("\n");
        out.push_str(Self::sign_off(tone));
        out
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_types::{AgentId, Vote};

    fn vote_on(proposal: &Proposal, value: VoteValue) -> Vote {
        Vote::new(
            proposal.id.clone(),
            AgentId::new("agent-1"),
            value,
            0.8,
        )
    }

    #[test]
    fn test_no_activity_variant_per_tone() {
        let renderer = TemplateRenderer::new();
        let empty = ActivitySummary::default();
        let friendly = renderer.render(DigestTone::Friendly, &empty);
        let formal = renderer.render(DigestTone::Formal, &empty);
        let neutral = renderer.render(DigestTone::Neutral, &empty);

        assert!(friendly.contains("All quiet"));
        assert!(formal.contains("No delegated activity"));
        assert!(neutral.contains("No activity"));
        // The no-activity variant carries no sections.
        for text in [friendly, formal, neutral] {
            assert!(!text.contains("##"));
        }
    }

    #[test]
    fn test_sections_render_in_order_and_omit_when_empty() {
        let renderer = TemplateRenderer::new();
        let voted = Proposal::new("Water-Treatment Plant Funding Gap");
        let activity = ActivitySummary {
            veto_alerts: vec![],
            votes: vec![VoteActivity {
                vote: vote_on(&voted, VoteValue::Approve),
                proposal: voted,
            }],
            new_proposals: vec![],
        };

        let text = renderer.render(DigestTone::Neutral, &activity);
        assert!(text.contains("## Recent Agent Votes"));
        assert!(text.contains("Water-Treatment Plant Funding Gap"));
        assert!(!text.contains("## Veto Window Alerts"));
        assert!(!text.contains("## New Proposals"));
        assert!(text.starts_with("Agent activity digest:"));
    }

    #[test]
    fn test_alerts_lead_when_present() {
        let renderer = TemplateRenderer::new();
        let urgent = Proposal::new("Library Budget Cut")
            .with_veto_window_end(chrono::Utc::now() + chrono::Duration::hours(4));
        let fresh = Proposal::new("Sidewalk Repair Levy");
        let activity = ActivitySummary {
            veto_alerts: vec![PendingReview {
                vote: vote_on(&urgent, VoteValue::Reject),
                proposal: urgent,
            }],
            votes: vec![],
            new_proposals: vec![fresh],
        };

        let text = renderer.render(DigestTone::Friendly, &activity);
        let alerts_at = text.find("## Veto Window Alerts").unwrap();
        let proposals_at = text.find("## New Proposals").unwrap();
        assert!(alerts_at < proposals_at);
        assert!(text.contains("rejected"));
    }

    #[test]
    fn test_empty_is_empty() {
        assert!(ActivitySummary::default().is_empty());
    }
}
