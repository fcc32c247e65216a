use anyhow::Result;
use serde::Serialize;
use uuid::Uuid;

use crate::database::Database;
use crate::message::normalize_phone;

/// Verified role carried by a session. Mutating operations check this
/// instead of trusting whichever UI branch made the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "role")]
pub enum Role {
    Parent { student_id: Uuid },
    Teacher { teacher_id: Uuid },
    Admin,
}

/// In-memory capability produced by a successful login. There is no
/// durable token model: losing the map (restart) logs everyone out.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: Uuid,
    #[serde(flatten)]
    pub role: Role,
}

impl Session {
    fn new(role: Role) -> Self {
        Session {
            token: Uuid::new_v4(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Teachers and the admin may mutate student records.
    pub fn can_manage_students(&self) -> bool {
        matches!(self.role, Role::Teacher { .. } | Role::Admin)
    }

    /// Parents only ever see their own student; staff see everyone.
    pub fn can_view_student(&self, student_id: Uuid) -> bool {
        match self.role {
            Role::Parent { student_id: own } => own == student_id,
            Role::Teacher { .. } | Role::Admin => true,
        }
    }

    pub fn parent_of(&self, student_id: Uuid) -> bool {
        matches!(self.role, Role::Parent { student_id: own } if own == student_id)
    }

    pub fn teacher_id(&self) -> Option<Uuid> {
        match self.role {
            Role::Teacher { teacher_id } => Some(teacher_id),
            _ => None,
        }
    }
}

/// Outcome of a login attempt: either a session or an inline message for
/// the form. Login failures are never hard errors.
#[derive(Debug)]
pub enum LoginOutcome {
    Granted(Session),
    Rejected(String),
    /// Parent code matched but no phone is on file yet; the caller must
    /// re-submit with a phone number.
    PhoneRequired,
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    admin_password: String,
}

impl AuthService {
    pub fn new(db: Database, admin_password: String) -> Self {
        Self { db, admin_password }
    }

    /// Parent login: numeric code match. First-time logins must also carry
    /// a phone number, persisted onto the student once.
    pub async fn login_parent(&self, code: &str, phone: Option<&str>) -> Result<LoginOutcome> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(LoginOutcome::Rejected("أدخل رمز الدخول".to_string()));
        }

        let student = match self.db.get_student_by_parent_code(code).await? {
            Some(student) => student,
            None => return Ok(LoginOutcome::Rejected("رمز الدخول غير صحيح".to_string())),
        };

        if student.parent_phone.is_none() {
            let Some(raw_phone) = phone else {
                return Ok(LoginOutcome::PhoneRequired);
            };
            let normalized = match normalize_phone(raw_phone) {
                Ok(digits) => digits,
                Err(message) => return Ok(LoginOutcome::Rejected(message)),
            };
            let mut student = student.clone();
            student.parent_phone = Some(normalized);
            self.db.save_student(&student).await?;
            return Ok(LoginOutcome::Granted(Session::new(Role::Parent {
                student_id: student.id,
            })));
        }

        Ok(LoginOutcome::Granted(Session::new(Role::Parent {
            student_id: student.id,
        })))
    }

    /// Teacher login: picked identity plus login code match.
    pub async fn login_teacher(&self, teacher_id: Uuid, login_code: &str) -> Result<LoginOutcome> {
        let teacher = match self.db.get_teacher(teacher_id).await? {
            Some(teacher) => teacher,
            None => return Ok(LoginOutcome::Rejected("المعلم غير موجود".to_string())),
        };

        if teacher.login_code != login_code.trim() {
            return Ok(LoginOutcome::Rejected("رمز الدخول غير صحيح".to_string()));
        }

        Ok(LoginOutcome::Granted(Session::new(Role::Teacher {
            teacher_id: teacher.id,
        })))
    }

    /// Admin login: single shared password.
    pub fn login_admin(&self, password: &str) -> LoginOutcome {
        if password == self.admin_password {
            LoginOutcome::Granted(Session::new(Role::Admin))
        } else {
            LoginOutcome::Rejected("كلمة المرور غير صحيحة".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_capabilities() {
        let student_id = Uuid::new_v4();
        let other_student = Uuid::new_v4();

        let parent = Session::new(Role::Parent { student_id });
        assert!(!parent.can_manage_students());
        assert!(parent.can_view_student(student_id));
        assert!(!parent.can_view_student(other_student));
        assert!(parent.parent_of(student_id));
        assert_eq!(parent.teacher_id(), None);

        let teacher_id = Uuid::new_v4();
        let teacher = Session::new(Role::Teacher { teacher_id });
        assert!(teacher.can_manage_students());
        assert!(teacher.can_view_student(other_student));
        assert_eq!(teacher.teacher_id(), Some(teacher_id));
        assert!(!teacher.is_admin());

        let admin = Session::new(Role::Admin);
        assert!(admin.is_admin());
        assert!(admin.can_manage_students());
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = Session::new(Role::Admin);
        let b = Session::new(Role::Admin);
        assert_ne!(a.token, b.token);
    }
}
