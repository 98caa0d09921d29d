use crate::models::{Priority, Task, TaskCategory, UserStats};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    pub current_xp: i64,
    pub level: i64,
    pub threshold: i64,
    pub level_up: bool,
}

pub fn xp_threshold(level: i64) -> i64 {
    level * 100
}

/// Adds `reward` to cumulative XP and climbs levels while XP is at or past
/// the current threshold. XP is never reset on level-up.
pub fn add_xp(current_xp: i64, level: i64, threshold: i64, reward: i64) -> LevelProgress {
    let current_xp = current_xp + reward.max(0);
    let mut level = level.max(1);
    let mut threshold = threshold;
    let mut level_up = false;

    while current_xp >= threshold {
        level += 1;
        threshold = xp_threshold(level);
        level_up = true;
    }

    LevelProgress {
        current_xp,
        level,
        threshold,
        level_up,
    }
}

/// Task reward = category base × priority multiplier × duration multiplier.
/// These numbers are product configuration, not derived from anything.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardTable {
    pub filming: i64,
    pub editing: i64,
    pub scripting: i64,
    pub research: i64,
    pub community: i64,
    pub admin: i64,
    pub personal: i64,
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub urgent: f64,
    /// (max minutes inclusive, multiplier), ascending.
    pub duration_tiers: Vec<(i64, f64)>,
    pub longer_than_all_tiers: f64,
}

impl Default for RewardTable {
    fn default() -> Self {
        RewardTable {
            filming: 40,
            editing: 40,
            scripting: 30,
            research: 20,
            community: 15,
            admin: 10,
            personal: 15,
            low: 1.0,
            medium: 1.2,
            high: 1.5,
            urgent: 2.0,
            duration_tiers: vec![(15, 1.0), (30, 1.2), (60, 1.5), (120, 2.0)],
            longer_than_all_tiers: 2.5,
        }
    }
}

impl RewardTable {
    pub fn base_xp(&self, category: TaskCategory) -> i64 {
        match category {
            TaskCategory::Filming => self.filming,
            TaskCategory::Editing => self.editing,
            TaskCategory::Scripting => self.scripting,
            TaskCategory::Research => self.research,
            TaskCategory::Community => self.community,
            TaskCategory::Admin => self.admin,
            TaskCategory::Personal => self.personal,
        }
    }

    pub fn priority_multiplier(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Low => self.low,
            Priority::Medium => self.medium,
            Priority::High => self.high,
            Priority::Urgent => self.urgent,
        }
    }

    pub fn duration_multiplier(&self, minutes: i64) -> f64 {
        self.duration_tiers
            .iter()
            .find(|(max_minutes, _)| minutes <= *max_minutes)
            .map(|(_, multiplier)| *multiplier)
            .unwrap_or(self.longer_than_all_tiers)
    }

    pub fn task_reward(&self, task: &Task) -> i64 {
        let xp = self.base_xp(task.category) as f64
            * self.priority_multiplier(task.priority)
            * self.duration_multiplier(task.estimated_minutes);
        xp.round() as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Achievement {
    FirstTask,
    TenTasks,
    FiftyTasks,
    HundredTasks,
    LevelFive,
    LevelTen,
    WeekStreak,
    MonthStreak,
}

pub const ACHIEVEMENTS: &[Achievement] = &[
    Achievement::FirstTask,
    Achievement::TenTasks,
    Achievement::FiftyTasks,
    Achievement::HundredTasks,
    Achievement::LevelFive,
    Achievement::LevelTen,
    Achievement::WeekStreak,
    Achievement::MonthStreak,
];

impl Achievement {
    pub fn id(&self) -> &'static str {
        match self {
            Achievement::FirstTask => "first_task",
            Achievement::TenTasks => "tasks_10",
            Achievement::FiftyTasks => "tasks_50",
            Achievement::HundredTasks => "tasks_100",
            Achievement::LevelFive => "level_5",
            Achievement::LevelTen => "level_10",
            Achievement::WeekStreak => "streak_7",
            Achievement::MonthStreak => "streak_30",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Achievement::FirstTask => "First Step",
            Achievement::TenTasks => "Getting Things Done",
            Achievement::FiftyTasks => "Productivity Machine",
            Achievement::HundredTasks => "Centurion",
            Achievement::LevelFive => "Rising Creator",
            Achievement::LevelTen => "Seasoned Creator",
            Achievement::WeekStreak => "On a Roll",
            Achievement::MonthStreak => "Unstoppable",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Achievement::FirstTask => "Complete your first task",
            Achievement::TenTasks => "Complete 10 tasks",
            Achievement::FiftyTasks => "Complete 50 tasks",
            Achievement::HundredTasks => "Complete 100 tasks",
            Achievement::LevelFive => "Reach level 5",
            Achievement::LevelTen => "Reach level 10",
            Achievement::WeekStreak => "Complete tasks 7 days in a row",
            Achievement::MonthStreak => "Complete tasks 30 days in a row",
        }
    }

    pub fn xp_reward(&self) -> i64 {
        match self {
            Achievement::FirstTask => 10,
            Achievement::TenTasks => 50,
            Achievement::FiftyTasks => 150,
            Achievement::HundredTasks => 300,
            Achievement::LevelFive => 100,
            Achievement::LevelTen => 250,
            Achievement::WeekStreak => 75,
            Achievement::MonthStreak => 300,
        }
    }

    pub fn is_earned(&self, stats: &UserStats) -> bool {
        match self {
            Achievement::FirstTask => stats.total_tasks_completed >= 1,
            Achievement::TenTasks => stats.total_tasks_completed >= 10,
            Achievement::FiftyTasks => stats.total_tasks_completed >= 50,
            Achievement::HundredTasks => stats.total_tasks_completed >= 100,
            Achievement::LevelFive => stats.level >= 5,
            Achievement::LevelTen => stats.level >= 10,
            Achievement::WeekStreak => stats.longest_streak >= 7,
            Achievement::MonthStreak => stats.longest_streak >= 30,
        }
    }
}

/// Consecutive calendar days with at least one completed task.
pub fn update_streak(stats: &mut UserStats, today: NaiveDate) {
    match stats.last_completed_on {
        Some(last) if last == today => return,
        Some(last) if last.succ_opt() == Some(today) => stats.current_streak += 1,
        _ => stats.current_streak = 1,
    }
    stats.last_completed_on = Some(today);
    stats.longest_streak = stats.longest_streak.max(stats.current_streak);
}

/// Stats after completing one task worth `reward` XP on `today`.
pub fn apply_task_completion(
    stats: &UserStats,
    reward: i64,
    today: NaiveDate,
) -> (UserStats, bool) {
    let mut next = stats.clone();
    let progress = add_xp(next.current_xp, next.level, next.xp_to_next_level, reward);
    next.current_xp = progress.current_xp;
    next.level = progress.level;
    next.xp_to_next_level = progress.threshold;
    next.total_tasks_completed += 1;
    update_streak(&mut next, today);
    (next, progress.level_up)
}
