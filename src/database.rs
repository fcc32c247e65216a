use anyhow::Result;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::log_db_operation;
use crate::models::*;

/// SQLite-backed store. Student records are written wholesale: the logs,
/// payments, schedule and next-plan columns hold the full JSON documents
/// and every save rewrites the entire row (last writer wins at student
/// granularity).
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let db = Database { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS students (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                teacher_id TEXT NOT NULL,
                parent_code TEXT NOT NULL,
                parent_phone TEXT,
                logs TEXT NOT NULL DEFAULT '[]',
                payments TEXT NOT NULL DEFAULT '[]',
                schedule TEXT NOT NULL DEFAULT '[]',
                next_plan TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS teachers (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                login_code TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS announcements (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                date TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        log_db_operation!(info, "migration", "database initialized");
        Ok(())
    }

    // Student operations

    pub async fn save_student(&self, student: &Student) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO students
                (id, name, teacher_id, parent_code, parent_phone, logs, payments, schedule, next_plan)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(student.id.to_string())
        .bind(&student.name)
        .bind(student.teacher_id.to_string())
        .bind(&student.parent_code)
        .bind(&student.parent_phone)
        .bind(serde_json::to_string(&student.logs)?)
        .bind(serde_json::to_string(&student.payments)?)
        .bind(serde_json::to_string(&student.schedule)?)
        .bind(
            student
                .next_plan
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .execute(&self.pool)
        .await?;

        log_db_operation!(debug, "save_student", student_id = student.id);
        Ok(())
    }

    pub async fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
        let row = sqlx::query("SELECT * FROM students WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_student).transpose()
    }

    pub async fn get_student_by_parent_code(&self, code: &str) -> Result<Option<Student>> {
        let row = sqlx::query("SELECT * FROM students WHERE parent_code = ?1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_student).transpose()
    }

    pub async fn get_all_students(&self) -> Result<Vec<Student>> {
        let rows = sqlx::query("SELECT * FROM students ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_student).collect()
    }

    pub async fn get_students_by_teacher(&self, teacher_id: Uuid) -> Result<Vec<Student>> {
        let rows = sqlx::query("SELECT * FROM students WHERE teacher_id = ?1 ORDER BY name")
            .bind(teacher_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_student).collect()
    }

    pub async fn parent_code_exists(&self, code: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM students WHERE parent_code = ?1")
            .bind(code)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("n");
        Ok(count > 0)
    }

    /// Deleting a student is the only path that deletes logs.
    pub async fn delete_student(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM students WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // Teacher operations

    pub async fn create_teacher(&self, teacher: &Teacher) -> Result<()> {
        sqlx::query("INSERT INTO teachers (id, name, login_code) VALUES (?1, ?2, ?3)")
            .bind(teacher.id.to_string())
            .bind(&teacher.name)
            .bind(&teacher.login_code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_teacher(&self, id: Uuid) -> Result<Option<Teacher>> {
        let row = sqlx::query("SELECT * FROM teachers WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(row_to_teacher).transpose()
    }

    pub async fn get_all_teachers(&self) -> Result<Vec<Teacher>> {
        let rows = sqlx::query("SELECT * FROM teachers ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(row_to_teacher).collect()
    }

    pub async fn delete_teacher(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM teachers WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // Announcement operations

    pub async fn create_announcement(&self, announcement: &Announcement) -> Result<()> {
        sqlx::query("INSERT INTO announcements (id, title, body, date) VALUES (?1, ?2, ?3, ?4)")
            .bind(announcement.id.to_string())
            .bind(&announcement.title)
            .bind(&announcement.body)
            .bind(announcement.date.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_all_announcements(&self) -> Result<Vec<Announcement>> {
        let rows = sqlx::query("SELECT * FROM announcements ORDER BY date DESC")
            .fetch_all(&self.pool)
            .await?;

        let mut announcements = Vec::new();
        for row in rows {
            announcements.push(Announcement {
                id: Uuid::parse_str(&row.get::<String, _>("id"))?,
                title: row.get("title"),
                body: row.get("body"),
                date: chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("date"))?
                    .with_timezone(&Utc),
            });
        }
        Ok(announcements)
    }

    pub async fn delete_announcement(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM announcements WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Seed a small mock dataset when no prior state exists, so a fresh
    /// deployment opens with something to look at.
    pub async fn seed_mock_data_if_empty(&self) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) as n FROM teachers")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("n");
        if count > 0 {
            return Ok(false);
        }

        let teacher = Teacher {
            id: Uuid::new_v4(),
            name: "الشيخ خالد".to_string(),
            login_code: "1111".to_string(),
        };
        self.create_teacher(&teacher).await?;

        let students = [
            ("أحمد محمود", "123456"),
            ("يوسف علي", "654321"),
        ];
        for (name, code) in students {
            let student = Student {
                id: Uuid::new_v4(),
                name: name.to_string(),
                teacher_id: teacher.id,
                parent_code: code.to_string(),
                parent_phone: None,
                logs: Vec::new(),
                payments: Vec::new(),
                schedule: vec![ScheduleDay::default(); 7],
                next_plan: Some(NextPlan {
                    jadeed: QuranAssignment::Surah {
                        name: "النبأ".to_string(),
                        ayah_from: 1,
                        ayah_to: 20,
                        grade: Grade::Good,
                    },
                    murajaah: vec![QuranAssignment::Juz {
                        number: 30,
                        grade: Grade::VeryGood,
                    }],
                }),
            };
            self.save_student(&student).await?;
        }

        log_db_operation!(info, "seed", "mock dataset created");
        Ok(true)
    }
}

fn row_to_student(row: sqlx::sqlite::SqliteRow) -> Result<Student> {
    Ok(Student {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        teacher_id: Uuid::parse_str(&row.get::<String, _>("teacher_id"))?,
        parent_code: row.get("parent_code"),
        parent_phone: row.get("parent_phone"),
        logs: serde_json::from_str(&row.get::<String, _>("logs"))?,
        payments: serde_json::from_str(&row.get::<String, _>("payments"))?,
        schedule: serde_json::from_str(&row.get::<String, _>("schedule"))?,
        next_plan: row
            .get::<Option<String>, _>("next_plan")
            .map(|s| serde_json::from_str(&s))
            .transpose()?,
    })
}

fn row_to_teacher(row: sqlx::sqlite::SqliteRow) -> Result<Teacher> {
    Ok(Teacher {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        name: row.get("name"),
        login_code: row.get("login_code"),
    })
}
