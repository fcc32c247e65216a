use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Local, Utc};
use uuid::Uuid;

use crate::database::Database;
use crate::models::*;

// Import logging macros
use crate::{log_service_start, log_service_success};

/// Grade defaults applied when yesterday's plan rolls over into today's
/// draft.
pub const DEFAULT_JADEED_GRADE: Grade = Grade::Good;
pub const DEFAULT_MURAJAAH_GRADE: Grade = Grade::VeryGood;

/// Default attendance pair pre-filled on a fresh draft.
pub const DEFAULT_ARRIVAL: &str = "16:00";
pub const DEFAULT_DEPARTURE: &str = "18:00";

/// A fee reminder is due once the latest payment is older than this.
pub const FEE_REMINDER_DAYS: i64 = 30;

/// Hard-coded starting assignment for students with no plan yet.
pub fn default_assignment() -> QuranAssignment {
    QuranAssignment::Surah {
        name: "الفاتحة".to_string(),
        ayah_from: 1,
        ayah_to: 7,
        grade: DEFAULT_JADEED_GRADE,
    }
}

fn default_attendance() -> Vec<AttendanceRecord> {
    vec![AttendanceRecord {
        arrival: DEFAULT_ARRIVAL.to_string(),
        departure: Some(DEFAULT_DEPARTURE.to_string()),
    }]
}

/// Calendar-day key in the viewer's local time zone. Day granularity only:
/// hours, minutes and offset are discarded before comparison.
pub fn day_key(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

/// Determine whether an editable log already exists for the current
/// calendar day and synthesize the editable drafts.
///
/// A same-day absence or Adab log is intentionally ignored by this lookup:
/// the day is treated as having no editable recitation log, and a save will
/// create the day's primary log alongside it.
pub fn open_for_today(student: &Student, now: DateTime<Utc>) -> (LogDraft, PlanDraft) {
    let today = day_key(now);

    let active = student
        .logs
        .iter()
        .find(|log| log.is_primary() && day_key(log.date) == today);

    let log_draft = match active {
        Some(log) => LogDraft {
            active_log_id: Some(log.id),
            jadeed: log.jadeed.clone().unwrap_or_else(default_assignment),
            murajaah: log.murajaah.clone(),
            attendance: log.attendance.clone(),
            notes: log.notes.clone(),
        },
        None => match &student.next_plan {
            // Plan rollover: the forward-declared plan becomes today's
            // draft, grades reset to the session defaults.
            Some(plan) => LogDraft {
                active_log_id: None,
                jadeed: plan.jadeed.with_grade(DEFAULT_JADEED_GRADE),
                murajaah: plan
                    .murajaah
                    .iter()
                    .map(|m| m.with_grade(DEFAULT_MURAJAAH_GRADE))
                    .collect(),
                attendance: default_attendance(),
                notes: String::new(),
            },
            None => LogDraft {
                active_log_id: None,
                jadeed: default_assignment(),
                murajaah: Vec::new(),
                attendance: default_attendance(),
                notes: String::new(),
            },
        },
    };

    let plan_draft = match &student.next_plan {
        Some(plan) => PlanDraft {
            jadeed: plan.jadeed.clone(),
            murajaah: plan.murajaah.clone(),
        },
        None => PlanDraft {
            jadeed: default_assignment(),
            murajaah: Vec::new(),
        },
    };

    (log_draft, plan_draft)
}

/// Apply a save to the student in place.
///
/// With an active log id only `attendance`, `jadeed`, `murajaah` and
/// `notes` are replaced on that log; every other field is untouched. The
/// id must point at a recitation log; absence and Adab entries cannot be
/// edited this way.
/// Without one, a fresh log is inserted at the front of the list - unless
/// the day already has a primary log, which is rejected instead of silently
/// duplicated. The next plan is overwritten unconditionally either way.
pub fn apply_save(
    student: &mut Student,
    draft: &LogDraft,
    plan_draft: &PlanDraft,
    teacher_id: Uuid,
    teacher_name: &str,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    let log_id = match draft.active_log_id {
        Some(id) => {
            let log = student
                .logs
                .iter_mut()
                .find(|log| log.id == id && log.is_primary())
                .ok_or_else(|| anyhow!("no editable recitation log '{}' on student", id))?;
            log.attendance = draft.attendance.clone();
            log.jadeed = Some(draft.jadeed.clone());
            log.murajaah = draft.murajaah.clone();
            log.notes = draft.notes.clone();
            id
        }
        None => {
            let today = day_key(now);
            if student
                .logs
                .iter()
                .any(|log| log.is_primary() && day_key(log.date) == today)
            {
                return Err(anyhow!(
                    "a recitation log for {} already exists; reopen the day instead",
                    today
                ));
            }

            let log = DailyLog {
                id: Uuid::new_v4(),
                date: now,
                teacher_id,
                teacher_name: teacher_name.to_string(),
                is_absent: false,
                is_adab: false,
                jadeed: Some(draft.jadeed.clone()),
                murajaah: draft.murajaah.clone(),
                attendance: draft.attendance.clone(),
                notes: draft.notes.clone(),
                seen_by_parent: false,
                seen_at: None,
                quiz: Vec::new(),
                parent_quiz_score: None,
                parent_quiz_max: None,
            };
            let id = log.id;
            student.logs.insert(0, log);
            id
        }
    };

    student.next_plan = Some(NextPlan {
        jadeed: plan_draft.jadeed.clone(),
        murajaah: plan_draft.murajaah.clone(),
    });

    Ok(log_id)
}

/// Insert an absence log for today. One absence record per day.
pub fn apply_absence(
    student: &mut Student,
    teacher_id: Uuid,
    teacher_name: &str,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    let today = day_key(now);
    if student
        .logs
        .iter()
        .any(|log| log.is_absent && day_key(log.date) == today)
    {
        return Err(anyhow!("an absence for {} already exists", today));
    }

    let log = DailyLog {
        id: Uuid::new_v4(),
        date: now,
        teacher_id,
        teacher_name: teacher_name.to_string(),
        is_absent: true,
        is_adab: false,
        jadeed: None,
        murajaah: Vec::new(),
        attendance: Vec::new(),
        notes: String::new(),
        seen_by_parent: false,
        seen_at: None,
        quiz: Vec::new(),
        parent_quiz_score: None,
        parent_quiz_max: None,
    };
    let id = log.id;
    student.logs.insert(0, log);
    Ok(id)
}

/// Insert an Adab session log for today carrying its quiz questions.
pub fn apply_adab_session(
    student: &mut Student,
    teacher_id: Uuid,
    teacher_name: &str,
    questions: Vec<QuizQuestion>,
    now: DateTime<Utc>,
) -> Result<Uuid> {
    if questions.is_empty() {
        return Err(anyhow!("an Adab session needs at least one question"));
    }
    let today = day_key(now);
    if student
        .logs
        .iter()
        .any(|log| log.is_adab && day_key(log.date) == today)
    {
        return Err(anyhow!("an Adab session for {} already exists", today));
    }

    let log = DailyLog {
        id: Uuid::new_v4(),
        date: now,
        teacher_id,
        teacher_name: teacher_name.to_string(),
        is_absent: false,
        is_adab: true,
        jadeed: None,
        murajaah: Vec::new(),
        attendance: Vec::new(),
        notes: String::new(),
        seen_by_parent: false,
        seen_at: None,
        quiz: questions,
        parent_quiz_score: None,
        parent_quiz_max: None,
    };
    let id = log.id;
    student.logs.insert(0, log);
    Ok(id)
}

/// Mark the given logs as seen by the parent. One-way: a log that is
/// already seen keeps its original `seen_at`.
pub fn apply_mark_seen(student: &mut Student, log_ids: &[Uuid], now: DateTime<Utc>) -> usize {
    let mut marked = 0;
    for log in student.logs.iter_mut() {
        if log_ids.contains(&log.id) && !log.seen_by_parent {
            log.seen_by_parent = true;
            log.seen_at = Some(now);
            marked += 1;
        }
    }
    marked
}

/// Whether the monthly fee reminder should show for this student: no
/// payment on record, or the latest one older than [`FEE_REMINDER_DAYS`].
pub fn fee_reminder_due(student: &Student, now: DateTime<Utc>) -> bool {
    match student.payments.iter().map(|p| p.date).max() {
        Some(latest) => now - latest > Duration::days(FEE_REMINDER_DAYS),
        None => true,
    }
}

/// Daily log lifecycle service: the pure rules above, wired to whole-student
/// persistence.
#[derive(Clone)]
pub struct LogService {
    db: Database,
}

impl LogService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn open_student_for_today(
        &self,
        student_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<(LogDraft, PlanDraft)>> {
        let student = match self.db.get_student(student_id).await? {
            Some(student) => student,
            None => return Ok(None),
        };
        Ok(Some(open_for_today(&student, now)))
    }

    pub async fn save_log(
        &self,
        student_id: Uuid,
        draft: &LogDraft,
        plan_draft: &PlanDraft,
        teacher_id: Uuid,
        teacher_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Student>> {
        log_service_start!("log_service", "save_log", student_id = student_id);

        let mut student = match self.db.get_student(student_id).await? {
            Some(student) => student,
            None => return Ok(None),
        };

        apply_save(&mut student, draft, plan_draft, teacher_id, teacher_name, now)?;
        self.db.save_student(&student).await?;

        log_service_success!("log_service", "save_log", student_id = student_id, "log saved");
        Ok(Some(student))
    }

    pub async fn record_absence(
        &self,
        student_id: Uuid,
        teacher_id: Uuid,
        teacher_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Student>> {
        let mut student = match self.db.get_student(student_id).await? {
            Some(student) => student,
            None => return Ok(None),
        };
        apply_absence(&mut student, teacher_id, teacher_name, now)?;
        self.db.save_student(&student).await?;
        Ok(Some(student))
    }

    pub async fn create_adab_session(
        &self,
        student_id: Uuid,
        teacher_id: Uuid,
        teacher_name: &str,
        questions: Vec<QuizQuestion>,
        now: DateTime<Utc>,
    ) -> Result<Option<Student>> {
        let mut student = match self.db.get_student(student_id).await? {
            Some(student) => student,
            None => return Ok(None),
        };
        apply_adab_session(&mut student, teacher_id, teacher_name, questions, now)?;
        self.db.save_student(&student).await?;
        Ok(Some(student))
    }

    pub async fn mark_logs_seen(
        &self,
        student_id: Uuid,
        log_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<Option<usize>> {
        let mut student = match self.db.get_student(student_id).await? {
            Some(student) => student,
            None => return Ok(None),
        };
        let marked = apply_mark_seen(&mut student, log_ids, now);
        if marked > 0 {
            self.db.save_student(&student).await?;
        }
        Ok(Some(marked))
    }

    /// Write the quiz outcome produced by a completed quiz session back
    /// onto the Adab log and persist.
    pub async fn record_quiz_result(
        &self,
        student_id: Uuid,
        log_id: Uuid,
        score: i32,
        max: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<()>> {
        let mut student = match self.db.get_student(student_id).await? {
            Some(student) => student,
            None => return Ok(None),
        };
        let log = student
            .logs
            .iter_mut()
            .find(|log| log.id == log_id)
            .ok_or_else(|| anyhow!("log '{}' not found on student", log_id))?;

        log.parent_quiz_score = Some(score);
        log.parent_quiz_max = Some(max);
        if !log.seen_by_parent {
            log.seen_by_parent = true;
            log.seen_at = Some(now);
        }

        self.db.save_student(&student).await?;
        Ok(Some(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn teacher_id() -> Uuid {
        Uuid::new_v4()
    }

    fn empty_student() -> Student {
        Student {
            id: Uuid::new_v4(),
            name: "أحمد".to_string(),
            teacher_id: teacher_id(),
            parent_code: "123456".to_string(),
            parent_phone: None,
            logs: Vec::new(),
            payments: Vec::new(),
            schedule: vec![ScheduleDay::default(); 7],
            next_plan: None,
        }
    }

    fn sample_plan() -> NextPlan {
        NextPlan {
            jadeed: QuranAssignment::Surah {
                name: "الملك".to_string(),
                ayah_from: 1,
                ayah_to: 15,
                grade: Grade::Excellent,
            },
            murajaah: vec![
                QuranAssignment::Juz {
                    number: 30,
                    grade: Grade::NeedsWork,
                },
                QuranAssignment::Surah {
                    name: "يس".to_string(),
                    ayah_from: 1,
                    ayah_to: 83,
                    grade: Grade::Acceptable,
                },
            ],
        }
    }

    #[test]
    fn test_open_without_plan_yields_hardcoded_defaults() {
        let student = empty_student();
        let (draft, plan) = open_for_today(&student, Utc::now());

        assert_eq!(draft.active_log_id, None);
        assert_eq!(draft.jadeed, default_assignment());
        assert!(draft.murajaah.is_empty());
        assert_eq!(draft.attendance.len(), 1);
        assert_eq!(draft.attendance[0].arrival, DEFAULT_ARRIVAL);
        assert_eq!(draft.attendance[0].departure.as_deref(), Some(DEFAULT_DEPARTURE));
        assert!(draft.notes.is_empty());

        assert_eq!(plan.jadeed, default_assignment());
        assert!(plan.murajaah.is_empty());
    }

    #[test]
    fn test_open_rolls_plan_into_draft_with_grade_defaults() {
        let mut student = empty_student();
        student.next_plan = Some(sample_plan());

        let (draft, plan) = open_for_today(&student, Utc::now());

        assert_eq!(draft.active_log_id, None);
        assert_eq!(draft.jadeed.grade(), Some(DEFAULT_JADEED_GRADE));
        assert_eq!(
            draft.jadeed,
            sample_plan().jadeed.with_grade(DEFAULT_JADEED_GRADE)
        );
        assert_eq!(draft.murajaah.len(), 2);
        for (item, planned) in draft.murajaah.iter().zip(sample_plan().murajaah.iter()) {
            assert_eq!(item.grade(), Some(DEFAULT_MURAJAAH_GRADE));
            assert_eq!(*item, planned.with_grade(DEFAULT_MURAJAAH_GRADE));
        }

        // The plan draft keeps the stored grades untouched.
        assert_eq!(plan.jadeed.grade(), Some(Grade::Excellent));
    }

    #[test]
    fn test_open_finds_existing_primary_log_for_today() {
        let mut student = empty_student();
        let tid = teacher_id();
        let now = Utc::now();

        let draft = LogDraft {
            active_log_id: None,
            jadeed: default_assignment(),
            murajaah: Vec::new(),
            attendance: vec![AttendanceRecord {
                arrival: "15:45".to_string(),
                departure: None,
            }],
            notes: "حفظ متقن".to_string(),
        };
        let plan = PlanDraft {
            jadeed: default_assignment(),
            murajaah: Vec::new(),
        };
        let log_id = apply_save(&mut student, &draft, &plan, tid, "الشيخ خالد", now).unwrap();

        let (reopened, _) = open_for_today(&student, now);
        assert_eq!(reopened.active_log_id, Some(log_id));
        assert_eq!(reopened.notes, "حفظ متقن");
        assert_eq!(reopened.attendance[0].arrival, "15:45");
    }

    #[test]
    fn test_open_ignores_absence_and_adab_logs() {
        let mut student = empty_student();
        let tid = teacher_id();
        let now = Utc::now();

        apply_absence(&mut student, tid, "الشيخ خالد", now).unwrap();
        apply_adab_session(
            &mut student,
            tid,
            "الشيخ خالد",
            vec![QuizQuestion {
                prompt: "س".to_string(),
                correct_answer: "أ".to_string(),
                wrong_answers: vec!["ب".to_string()],
            }],
            now,
        )
        .unwrap();

        let (draft, _) = open_for_today(&student, now);
        // The day has logs, but none editable: the save path will insert.
        assert_eq!(draft.active_log_id, None);
    }

    #[test]
    fn test_open_ignores_yesterdays_log() {
        let mut student = empty_student();
        let tid = teacher_id();
        let yesterday = Utc::now() - Duration::days(1);

        let draft = LogDraft {
            active_log_id: None,
            jadeed: default_assignment(),
            murajaah: Vec::new(),
            attendance: Vec::new(),
            notes: String::new(),
        };
        let plan = PlanDraft {
            jadeed: default_assignment(),
            murajaah: Vec::new(),
        };
        apply_save(&mut student, &draft, &plan, tid, "الشيخ خالد", yesterday).unwrap();

        let (today_draft, _) = open_for_today(&student, Utc::now());
        assert_eq!(today_draft.active_log_id, None);
    }

    #[test]
    fn test_save_insert_prepends_and_initializes_flags() {
        let mut student = empty_student();
        let tid = teacher_id();
        let now = Utc.with_ymd_and_hms(2024, 9, 1, 17, 0, 0).unwrap();

        let draft = LogDraft {
            active_log_id: None,
            jadeed: default_assignment(),
            murajaah: Vec::new(),
            attendance: Vec::new(),
            notes: String::new(),
        };
        let plan = PlanDraft {
            jadeed: sample_plan().jadeed,
            murajaah: sample_plan().murajaah,
        };

        assert_eq!(student.logs.len(), 0);
        apply_save(&mut student, &draft, &plan, tid, "الشيخ خالد", now).unwrap();
        assert_eq!(student.logs.len(), 1);

        let log = &student.logs[0];
        assert_eq!(log.date, now);
        assert_eq!(log.teacher_id, tid);
        assert_eq!(log.teacher_name, "الشيخ خالد");
        assert!(!log.seen_by_parent);
        assert!(!log.is_absent);
        assert!(!log.is_adab);

        // The plan is always overwritten as part of the same save.
        assert_eq!(student.next_plan, Some(sample_plan()));
    }

    #[test]
    fn test_save_update_touches_only_editable_fields() {
        let mut student = empty_student();
        let tid = teacher_id();
        let now = Utc::now();

        let draft = LogDraft {
            active_log_id: None,
            jadeed: default_assignment(),
            murajaah: Vec::new(),
            attendance: Vec::new(),
            notes: "أول".to_string(),
        };
        let plan = PlanDraft {
            jadeed: default_assignment(),
            murajaah: Vec::new(),
        };
        let log_id = apply_save(&mut student, &draft, &plan, tid, "الشيخ خالد", now).unwrap();

        // Simulate the parent having seen it before the teacher edits.
        student.logs[0].seen_by_parent = true;
        let before = student.logs[0].clone();

        // Also an older log that must stay byte-identical.
        apply_absence(&mut student, tid, "الشيخ خالد", now - Duration::days(1)).unwrap();
        let untouched = student.logs[0].clone();

        let edit = LogDraft {
            active_log_id: Some(log_id),
            jadeed: default_assignment().with_grade(Grade::Excellent),
            murajaah: vec![QuranAssignment::Juz {
                number: 29,
                grade: Grade::Good,
            }],
            attendance: vec![AttendanceRecord {
                arrival: "16:10".to_string(),
                departure: Some("18:05".to_string()),
            }],
            notes: "معدل".to_string(),
        };
        apply_save(&mut student, &edit, &plan, tid, "الشيخ خالد", now).unwrap();

        assert_eq!(student.logs.len(), 2);
        let updated = student.logs.iter().find(|l| l.id == log_id).unwrap();
        assert_eq!(updated.notes, "معدل");
        assert_eq!(updated.murajaah.len(), 1);
        assert_eq!(updated.jadeed.as_ref().unwrap().grade(), Some(Grade::Excellent));
        // Identity, date, teacher and seen state survive the edit.
        assert_eq!(updated.id, before.id);
        assert_eq!(updated.date, before.date);
        assert_eq!(updated.teacher_name, before.teacher_name);
        assert!(updated.seen_by_parent);

        let other = student.logs.iter().find(|l| l.id == untouched.id).unwrap();
        assert_eq!(*other, untouched);
    }

    #[test]
    fn test_save_rejects_second_primary_log_same_day() {
        let mut student = empty_student();
        let tid = teacher_id();
        let now = Utc::now();

        let draft = LogDraft {
            active_log_id: None,
            jadeed: default_assignment(),
            murajaah: Vec::new(),
            attendance: Vec::new(),
            notes: String::new(),
        };
        let plan = PlanDraft {
            jadeed: default_assignment(),
            murajaah: Vec::new(),
        };
        apply_save(&mut student, &draft, &plan, tid, "الشيخ خالد", now).unwrap();

        let second = apply_save(&mut student, &draft, &plan, tid, "الشيخ خالد", now);
        assert!(second.is_err());
        assert_eq!(student.logs.len(), 1);
    }

    #[test]
    fn test_save_allowed_on_day_with_absence_or_adab() {
        let mut student = empty_student();
        let tid = teacher_id();
        let now = Utc::now();

        apply_absence(&mut student, tid, "الشيخ خالد", now).unwrap();

        let draft = LogDraft {
            active_log_id: None,
            jadeed: default_assignment(),
            murajaah: Vec::new(),
            attendance: Vec::new(),
            notes: String::new(),
        };
        let plan = PlanDraft {
            jadeed: default_assignment(),
            murajaah: Vec::new(),
        };
        apply_save(&mut student, &draft, &plan, tid, "الشيخ خالد", now).unwrap();
        assert_eq!(student.logs.len(), 2);
    }

    #[test]
    fn test_save_update_rejects_absence_and_adab_ids() {
        let mut student = empty_student();
        let tid = teacher_id();
        let now = Utc::now();

        let absence_id = apply_absence(&mut student, tid, "الشيخ خالد", now).unwrap();

        let draft = LogDraft {
            active_log_id: Some(absence_id),
            jadeed: default_assignment(),
            murajaah: Vec::new(),
            attendance: Vec::new(),
            notes: String::new(),
        };
        let plan = PlanDraft {
            jadeed: default_assignment(),
            murajaah: Vec::new(),
        };
        assert!(apply_save(&mut student, &draft, &plan, tid, "الشيخ خالد", now).is_err());
        assert_eq!(student.logs[0].jadeed, None);
        assert!(student.logs[0].is_absent);
        assert!(student.logs[0].attendance.is_empty());
    }

    #[test]
    fn test_duplicate_absence_rejected() {
        let mut student = empty_student();
        let tid = teacher_id();
        let now = Utc::now();

        apply_absence(&mut student, tid, "الشيخ خالد", now).unwrap();
        assert!(apply_absence(&mut student, tid, "الشيخ خالد", now).is_err());
    }

    #[test]
    fn test_mark_seen_is_one_way_and_idempotent() {
        let mut student = empty_student();
        let tid = teacher_id();
        let first = Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 9, 2, 12, 0, 0).unwrap();

        let id = apply_absence(&mut student, tid, "الشيخ خالد", first).unwrap();

        assert_eq!(apply_mark_seen(&mut student, &[id], first), 1);
        assert_eq!(student.logs[0].seen_at, Some(first));

        // Second pass is a no-op: seen_at keeps the first timestamp.
        assert_eq!(apply_mark_seen(&mut student, &[id], second), 0);
        assert_eq!(student.logs[0].seen_at, Some(first));
        assert!(student.logs[0].seen_by_parent);
    }

    #[test]
    fn test_fee_reminder_threshold() {
        let mut student = empty_student();
        let now = Utc::now();

        // No payments: reminder due.
        assert!(fee_reminder_due(&student, now));

        student.payments.push(Payment {
            id: Uuid::new_v4(),
            amount: 200.0,
            date: now - Duration::days(10),
            note: None,
        });
        assert!(!fee_reminder_due(&student, now));

        student.payments[0].date = now - Duration::days(31);
        assert!(fee_reminder_due(&student, now));
    }
}
