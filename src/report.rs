//! Aggregate reports over finished sessions.
//!
//! Printed between sessions, at the end of a run and by `cadence report`.

use std::collections::BTreeMap;

use colored::Colorize;
use serde::Serialize;

use crate::session::{Limit, SessionState};

/// Totals across a slice of sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AggregateStats {
    pub total_sessions: usize,
    /// Wall-clock minutes across finished sessions
    pub total_minutes: i64,
    pub total_interactions: u32,
    pub successful_interactions: u32,
    pub likes: u32,
    pub watched: u32,
    pub comments: u32,
    pub pm: u32,
    pub followed: u32,
    pub unfollowed: u32,
    pub scraped: u32,
    pub crashes: u32,
    /// Interactions per job target
    pub by_target: BTreeMap<String, u32>,
    /// Follower change from the first session's start to the last session's end
    pub followers_change: Option<i64>,
    /// Following change over the same span
    pub following_change: Option<i64>,
}

impl AggregateStats {
    #[must_use]
    pub fn from_sessions(sessions: &[SessionState]) -> Self {
        let mut stats = Self {
            total_sessions: sessions.len(),
            ..Self::default()
        };

        for session in sessions {
            stats.total_minutes += session.duration().map(|d| d.num_minutes()).unwrap_or(0);
            stats.total_interactions += session.count(Limit::Total);
            stats.successful_interactions += session.count(Limit::Success);
            stats.likes += session.total_likes;
            stats.watched += session.total_watched;
            stats.comments += session.total_comments;
            stats.pm += session.total_pm;
            stats.followed += session.count(Limit::Follows);
            stats.unfollowed += session.total_unfollowed;
            stats.scraped += session.count(Limit::Scraped);
            stats.crashes += session.total_crashes;
            for (target, count) in &session.total_interactions {
                *stats.by_target.entry(target.clone()).or_insert(0) += count;
            }
        }

        let first = sessions.iter().find_map(|s| s.profile);
        let last = sessions.iter().rev().find_map(|s| s.profile_end.or(s.profile));
        if let (Some(first), Some(last)) = (first, last) {
            let (_, followers, following) = first.drift(&last);
            stats.followers_change = Some(followers);
            stats.following_change = Some(following);
        }

        stats
    }

    /// Print the report to stdout.
    pub fn print(&self, title: &str) {
        println!("\n{} {}", "Report:".cyan().bold(), title);
        println!("{}", "─".repeat(50));

        if self.total_sessions == 0 {
            println!("   No sessions found.");
            return;
        }

        println!(
            "   Sessions: {} | Duration: {}h {:02}m",
            self.total_sessions,
            self.total_minutes / 60,
            self.total_minutes % 60
        );
        println!(
            "   Interactions: {} ({} successful)",
            self.total_interactions, self.successful_interactions
        );
        println!(
            "   Likes: {} | Watched: {} | Comments: {} | PM: {}",
            self.likes, self.watched, self.comments, self.pm
        );
        println!(
            "   Followed: {} | Unfollowed: {} | Scraped: {}",
            self.followed, self.unfollowed, self.scraped
        );

        if let (Some(followers), Some(following)) = (self.followers_change, self.following_change) {
            println!(
                "   Followers: {} | Following: {}",
                signed(followers),
                signed(following)
            );
        }

        for (target, count) in &self.by_target {
            println!("   {} {}: {}", "·".bright_blue(), target, count);
        }

        if self.crashes > 0 {
            println!("   {} Crashes: {}", "Warning:".yellow(), self.crashes);
        }
    }
}

fn signed(value: i64) -> String {
    if value > 0 {
        format!("+{}", value).green().to_string()
    } else if value < 0 {
        value.to_string().red().to_string()
    } else {
        "0".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ProfileCounts;
    use crate::session::SessionLimits;
    use crate::storage::InteractionUpdate;

    fn session(followers: u64, end_followers: u64) -> SessionState {
        let mut session = SessionState::new(SessionLimits::unlimited(), 5);
        session.profile = Some(ProfileCounts {
            posts: 1,
            followers,
            following: 10,
        });
        session.profile_end = Some(ProfileCounts {
            posts: 1,
            followers: end_followers,
            following: 12,
        });
        session
    }

    #[test]
    fn test_empty_report() {
        let stats = AggregateStats::from_sessions(&[]);
        assert_eq!(stats.total_sessions, 0);
        assert_eq!(stats.followers_change, None);
    }

    #[test]
    fn test_totals_across_sessions() {
        let mut first = session(100, 104);
        first.record_interaction("blogger", &InteractionUpdate::new("bob").with_likes(2));
        first.record_interaction("blogger", &InteractionUpdate::new("carol").with_follow(false));
        first.add_crash();
        let mut second = session(104, 110);
        second.record_interaction("hashtag", &InteractionUpdate::new("dave").with_likes(1));
        second.record_interaction("unfollow", &InteractionUpdate::new("erin").with_unfollow());

        let stats = AggregateStats::from_sessions(&[first, second]);
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_interactions, 3);
        assert_eq!(stats.successful_interactions, 3);
        assert_eq!(stats.likes, 3);
        assert_eq!(stats.followed, 1);
        assert_eq!(stats.unfollowed, 1);
        assert_eq!(stats.crashes, 1);
        assert_eq!(stats.by_target.get("blogger"), Some(&2));
        assert_eq!(stats.by_target.get("hashtag"), Some(&1));
        assert_eq!(stats.followers_change, Some(10));
        assert_eq!(stats.following_change, Some(2));
    }

    #[test]
    fn test_report_serializes() {
        let stats = AggregateStats::from_sessions(&[session(1, 2)]);
        let json = serde_json::to_value(&stats).expect("serialize");
        assert_eq!(json["total_sessions"], 1);
        assert_eq!(json["followers_change"], 1);
    }
}
