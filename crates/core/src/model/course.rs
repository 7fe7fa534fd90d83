use crate::model::ids::CourseId;

/// How far a learner is through a course, counted in completed lessons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseProgress {
    course_id: CourseId,
    completed: u32,
    total: u32,
    percent: u8,
}

impl CourseProgress {
    /// Completed lessons beyond `total` are clamped; an empty course is 0%.
    #[must_use]
    pub fn new(course_id: CourseId, completed: u32, total: u32) -> Self {
        let completed = completed.min(total);
        let percent = if total == 0 {
            0
        } else {
            let numerator = 200 * u64::from(completed) + u64::from(total);
            u8::try_from(numerator / (2 * u64::from(total))).unwrap_or(100)
        };
        Self {
            course_id,
            completed,
            total,
            percent,
        }
    }

    #[must_use]
    pub fn course_id(&self) -> CourseId {
        self.course_id
    }

    #[must_use]
    pub fn completed(&self) -> u32 {
        self.completed
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn percent(&self) -> u8 {
        self.percent
    }

    #[must_use]
    pub fn rank(&self) -> ProgressRank {
        ProgressRank::for_percent(self.percent)
    }
}

/// Tier label shown next to a learner's course progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProgressRank {
    Noob,
    NewPlayer,
    ProPlayer,
    Hacker,
    God,
}

impl ProgressRank {
    #[must_use]
    pub fn for_percent(percent: u8) -> Self {
        match percent {
            100.. => Self::God,
            75.. => Self::Hacker,
            50.. => Self::ProPlayer,
            25.. => Self::NewPlayer,
            _ => Self::Noob,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Noob => "NOOB",
            Self::NewPlayer => "NEW PLAYER",
            Self::ProPlayer => "PRO PLAYER",
            Self::Hacker => "HACKER",
            Self::God => "GOD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_course_is_zero_percent() {
        let p = CourseProgress::new(CourseId::new(1), 0, 0);
        assert_eq!(p.percent(), 0);
        assert_eq!(p.rank(), ProgressRank::Noob);
    }

    #[test]
    fn percent_rounds_and_clamps() {
        assert_eq!(CourseProgress::new(CourseId::new(1), 1, 3).percent(), 33);
        assert_eq!(CourseProgress::new(CourseId::new(1), 2, 3).percent(), 67);
        let over = CourseProgress::new(CourseId::new(1), 9, 4);
        assert_eq!(over.completed(), 4);
        assert_eq!(over.percent(), 100);
    }

    #[test]
    fn rank_boundaries() {
        assert_eq!(ProgressRank::for_percent(24), ProgressRank::Noob);
        assert_eq!(ProgressRank::for_percent(25), ProgressRank::NewPlayer);
        assert_eq!(ProgressRank::for_percent(50), ProgressRank::ProPlayer);
        assert_eq!(ProgressRank::for_percent(75), ProgressRank::Hacker);
        assert_eq!(ProgressRank::for_percent(100), ProgressRank::God);
        assert_eq!(ProgressRank::God.label(), "GOD");
    }
}
