use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recitation grade scale, ordered worst to best.
///
/// The numeric score feeds the rolling performance chart on the parent
/// dashboard, the label is what teachers and parents actually see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    NeedsWork,
    Acceptable,
    Good,
    VeryGood,
    Excellent,
}

impl Grade {
    pub fn score(self) -> i32 {
        match self {
            Grade::NeedsWork => 1,
            Grade::Acceptable => 2,
            Grade::Good => 3,
            Grade::VeryGood => 4,
            Grade::Excellent => 5,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Grade::NeedsWork => "يحتاج تحسين",
            Grade::Acceptable => "مقبول",
            Grade::Good => "جيد",
            Grade::VeryGood => "جيد جدا",
            Grade::Excellent => "ممتاز",
        }
    }
}

/// One sub-assignment inside a Multi assignment. The grade is optional
/// because teachers often grade the whole bundle rather than each part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubSurah {
    pub name: String,
    pub ayah_from: u16,
    pub ayah_to: u16,
    pub grade: Option<Grade>,
}

/// A recitation unit. Each variant carries only the fields that are
/// meaningful for it; non-Multi variants always carry a grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuranAssignment {
    Surah {
        name: String,
        ayah_from: u16,
        ayah_to: u16,
        grade: Grade,
    },
    Range {
        start_name: String,
        end_name: String,
        grade: Grade,
    },
    Juz {
        number: u8,
        grade: Grade,
    },
    Multi {
        parts: Vec<SubSurah>,
    },
}

impl QuranAssignment {
    /// Human-readable description used in the parent hand-off message.
    pub fn describe(&self) -> String {
        match self {
            QuranAssignment::Surah {
                name,
                ayah_from,
                ayah_to,
                ..
            } => format!("سورة {} ({}-{})", name, ayah_from, ayah_to),
            QuranAssignment::Range {
                start_name,
                end_name,
                ..
            } => format!("من سورة {} إلى سورة {}", start_name, end_name),
            QuranAssignment::Juz { number, .. } => {
                format!("الجزء {}", crate::quran::juz_name(*number))
            }
            QuranAssignment::Multi { parts } => parts
                .iter()
                .map(|p| format!("سورة {} ({}-{})", p.name, p.ayah_from, p.ayah_to))
                .collect::<Vec<_>>()
                .join(" و "),
        }
    }

    /// The single grade for non-Multi assignments. Multi bundles report no
    /// overall grade.
    pub fn grade(&self) -> Option<Grade> {
        match self {
            QuranAssignment::Surah { grade, .. }
            | QuranAssignment::Range { grade, .. }
            | QuranAssignment::Juz { grade, .. } => Some(*grade),
            QuranAssignment::Multi { .. } => None,
        }
    }

    /// Copy of this assignment with the grade forced to `grade`. For Multi
    /// bundles the per-part grades are overwritten instead.
    pub fn with_grade(&self, grade: Grade) -> QuranAssignment {
        match self {
            QuranAssignment::Surah {
                name,
                ayah_from,
                ayah_to,
                ..
            } => QuranAssignment::Surah {
                name: name.clone(),
                ayah_from: *ayah_from,
                ayah_to: *ayah_to,
                grade,
            },
            QuranAssignment::Range {
                start_name,
                end_name,
                ..
            } => QuranAssignment::Range {
                start_name: start_name.clone(),
                end_name: end_name.clone(),
                grade,
            },
            QuranAssignment::Juz { number, .. } => QuranAssignment::Juz {
                number: *number,
                grade,
            },
            QuranAssignment::Multi { parts } => QuranAssignment::Multi {
                parts: parts
                    .iter()
                    .map(|p| SubSurah {
                        name: p.name.clone(),
                        ayah_from: p.ayah_from,
                        ayah_to: p.ayah_to,
                        grade: Some(grade),
                    })
                    .collect(),
            },
        }
    }
}

/// Arrival/departure pair for one attendance entry, both "HH:MM" 24-hour
/// strings as captured by the teacher form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub arrival: String,
    pub departure: Option<String>,
}

/// One multiple-choice question inside an Adab session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub prompt: String,
    pub correct_answer: String,
    pub wrong_answers: Vec<String>,
}

/// One calendar-day record for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub teacher_id: Uuid,
    pub teacher_name: String,
    pub is_absent: bool,
    pub is_adab: bool,
    pub jadeed: Option<QuranAssignment>,
    pub murajaah: Vec<QuranAssignment>,
    pub attendance: Vec<AttendanceRecord>,
    pub notes: String,
    pub seen_by_parent: bool,
    pub seen_at: Option<DateTime<Utc>>,
    /// Present only on Adab logs.
    pub quiz: Vec<QuizQuestion>,
    pub parent_quiz_score: Option<i32>,
    pub parent_quiz_max: Option<i32>,
}

impl DailyLog {
    /// A primary log is the day's editable recitation record. Absence and
    /// Adab logs never count as primary.
    pub fn is_primary(&self) -> bool {
        !self.is_absent && !self.is_adab
    }

    /// A quiz is completed iff a score has been written; re-viewing a
    /// completed log never re-enters the quiz flow.
    pub fn quiz_completed(&self) -> bool {
        self.parent_quiz_score.is_some()
    }
}

/// The teacher's forward-declared assignment for the next session. Not a
/// log: it carries no date of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextPlan {
    pub jadeed: QuranAssignment,
    pub murajaah: Vec<QuranAssignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    pub name: String,
    pub time: String,
}

/// One weekday of the student's weekly schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDay {
    pub day_off: bool,
    pub events: Vec<ScheduleEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub teacher_id: Uuid,
    /// Parent-facing login code; uniqueness is attempted at generation time.
    pub parent_code: String,
    pub parent_phone: Option<String>,
    /// Insertion order, newest first after a save. Not guaranteed
    /// chronological; sort explicitly when rendering.
    pub logs: Vec<DailyLog>,
    pub payments: Vec<Payment>,
    /// One entry per weekday, Sunday first.
    pub schedule: Vec<ScheduleDay>,
    pub next_plan: Option<NextPlan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teacher {
    pub id: Uuid,
    pub name: String,
    pub login_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub date: DateTime<Utc>,
}

/// Editable draft for today's log, as loaded by `open_for_today`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogDraft {
    /// Set when an editable log already exists for today; a save then
    /// updates that log in place instead of inserting.
    pub active_log_id: Option<Uuid>,
    pub jadeed: QuranAssignment,
    pub murajaah: Vec<QuranAssignment>,
    pub attendance: Vec<AttendanceRecord>,
    pub notes: String,
}

/// Editable draft for the next-plan state, feeding tomorrow's default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub jadeed: QuranAssignment,
    pub murajaah: Vec<QuranAssignment>,
}
