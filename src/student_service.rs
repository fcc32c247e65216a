use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::database::Database;
use crate::models::*;

// Import logging macros
use crate::{log_service_error, log_service_start};

/// How many collision retries before giving up on a random parent code.
const PARENT_CODE_ATTEMPTS: usize = 20;

/// Roster management: students, teachers, announcements and payments.
#[derive(Clone)]
pub struct StudentService {
    db: Database,
}

impl StudentService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Create a student with a fresh parent code and an empty week.
    pub async fn create_student(&self, name: &str, teacher_id: Uuid) -> Result<Student> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("student name is required"));
        }
        if self.db.get_teacher(teacher_id).await?.is_none() {
            return Err(anyhow!("teacher '{}' not found", teacher_id));
        }

        let parent_code = self.generate_parent_code().await?;
        let student = Student {
            id: Uuid::new_v4(),
            name: name.to_string(),
            teacher_id,
            parent_code,
            parent_phone: None,
            logs: Vec::new(),
            payments: Vec::new(),
            schedule: vec![ScheduleDay::default(); 7],
            next_plan: None,
        };

        self.db.save_student(&student).await?;
        Ok(student)
    }

    /// Six random digits, re-rolled on collision. Uniqueness is attempted,
    /// not guaranteed: a code inserted between the check and the save can
    /// still collide.
    async fn generate_parent_code(&self) -> Result<String> {
        for _ in 0..PARENT_CODE_ATTEMPTS {
            let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
            if !self.db.parent_code_exists(&code).await? {
                return Ok(code);
            }
        }
        log_service_error!(
            "student_service",
            "generate_parent_code",
            error = anyhow!("exhausted {} attempts", PARENT_CODE_ATTEMPTS)
        );
        Err(anyhow!("could not generate a unique parent code"))
    }

    pub async fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
        self.db.get_student(id).await
    }

    pub async fn get_all_students(&self) -> Result<Vec<Student>> {
        self.db.get_all_students().await
    }

    pub async fn get_students_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Student>> {
        self.db.get_students_by_teacher(teacher_id).await
    }

    /// Bulk deletion of a student's logs happens only here, as part of
    /// deleting the student.
    pub async fn delete_student(&self, id: Uuid) -> Result<bool> {
        log_service_start!("student_service", "delete_student", student_id = id);
        self.db.delete_student(id).await
    }

    pub async fn record_payment(
        &self,
        student_id: Uuid,
        amount: f64,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        if amount <= 0.0 {
            return Err(anyhow!("payment amount must be positive"));
        }

        let mut student = match self.db.get_student(student_id).await? {
            Some(student) => student,
            None => return Ok(None),
        };

        let payment = Payment {
            id: Uuid::new_v4(),
            amount,
            date: now,
            note,
        };
        student.payments.push(payment.clone());
        self.db.save_student(&student).await?;
        Ok(Some(payment))
    }

    /// Replace the student's weekly schedule wholesale (seven days).
    pub async fn update_schedule(
        &self,
        student_id: Uuid,
        schedule: Vec<ScheduleDay>,
    ) -> Result<Option<Student>> {
        if schedule.len() != 7 {
            return Err(anyhow!("a weekly schedule has exactly 7 days"));
        }

        let mut student = match self.db.get_student(student_id).await? {
            Some(student) => student,
            None => return Ok(None),
        };
        student.schedule = schedule;
        self.db.save_student(&student).await?;
        Ok(Some(student))
    }

    // Teacher operations

    pub async fn create_teacher(&self, name: &str, login_code: &str) -> Result<Teacher> {
        let name = name.trim();
        let login_code = login_code.trim();
        if name.is_empty() || login_code.is_empty() {
            return Err(anyhow!("teacher name and login code are required"));
        }

        let teacher = Teacher {
            id: Uuid::new_v4(),
            name: name.to_string(),
            login_code: login_code.to_string(),
        };
        self.db.create_teacher(&teacher).await?;
        Ok(teacher)
    }

    pub async fn get_all_teachers(&self) -> Result<Vec<Teacher>> {
        self.db.get_all_teachers().await
    }

    pub async fn get_teacher(&self, id: Uuid) -> Result<Option<Teacher>> {
        self.db.get_teacher(id).await
    }

    pub async fn delete_teacher(&self, id: Uuid) -> Result<bool> {
        self.db.delete_teacher(id).await
    }

    // Announcement operations

    pub async fn create_announcement(
        &self,
        title: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> Result<Announcement> {
        if title.trim().is_empty() {
            return Err(anyhow!("announcement title is required"));
        }

        let announcement = Announcement {
            id: Uuid::new_v4(),
            title: title.trim().to_string(),
            body: body.trim().to_string(),
            date: now,
        };
        self.db.create_announcement(&announcement).await?;
        Ok(announcement)
    }

    pub async fn get_all_announcements(&self) -> Result<Vec<Announcement>> {
        self.db.get_all_announcements().await
    }

    pub async fn delete_announcement(&self, id: Uuid) -> Result<bool> {
        self.db.delete_announcement(id).await
    }
}
