use chrono::{DateTime, Local, Utc};

use crate::models::{AttendanceRecord, QuranAssignment, Student};

/// Fixed multi-line template for the parent hand-off message. Pure
/// formatting: the log must already be saved so the message reflects
/// persisted data.
pub fn compose_parent_message(
    student: &Student,
    jadeed: &QuranAssignment,
    murajaah: &[QuranAssignment],
    attendance: &[AttendanceRecord],
    next_jadeed: &QuranAssignment,
    next_murajaah: &[QuranAssignment],
    now: DateTime<Utc>,
) -> String {
    let date = now.with_timezone(&Local).format("%Y-%m-%d");

    let attendance_line = attendance
        .first()
        .map(|record| {
            let arrival = format_time_12_hour(&record.arrival);
            match &record.departure {
                Some(departure) => {
                    format!("\nالحضور: {} - {}", arrival, format_time_12_hour(departure))
                }
                None => format!("\nالحضور: {}", arrival),
            }
        })
        .unwrap_or_default();

    let jadeed_line = match jadeed.grade() {
        Some(grade) => format!("{} - {}", jadeed.describe(), grade.label()),
        None => jadeed.describe(),
    };

    let murajaah_line = if murajaah.is_empty() {
        "لا يوجد".to_string()
    } else {
        murajaah
            .iter()
            .map(|m| m.describe())
            .collect::<Vec<_>>()
            .join("، ")
    };

    let next_murajaah_line = if next_murajaah.is_empty() {
        "لا يوجد".to_string()
    } else {
        next_murajaah
            .iter()
            .map(|m| m.describe())
            .collect::<Vec<_>>()
            .join("، ")
    };

    format!(
        "*تقرير الحفظ اليومي*\n\
         الطالب: {}\n\
         التاريخ: {}{}\n\n\
         *الجديد:* {}\n\
         *المراجعة:* {}\n\n\
         *واجب الغد*\n\
         *الجديد:* {}\n\
         *المراجعة:* {}",
        student.name,
        date,
        attendance_line,
        jadeed_line,
        murajaah_line,
        next_jadeed.describe(),
        next_murajaah_line,
    )
}

/// Strip common separators and report the digits, or an inline message
/// when the number is too short. Minimum length check only; no carrier
/// validation.
pub fn normalize_phone(raw: &str) -> Result<String, String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 10 {
        return Err("رقم الهاتف يجب أن يكون 10 أرقام على الأقل".to_string());
    }
    Ok(digits)
}

/// Build the wa.me deep link: hard-coded country prefix + stored phone,
/// message text URL-encoded.
pub fn whatsapp_link(country_code: &str, phone: &str, message: &str) -> String {
    format!(
        "https://wa.me/{}{}?text={}",
        country_code,
        phone.trim_start_matches('0'),
        urlencoding::encode(message)
    )
}

/// Render an "HH:MM" 24-hour string in 12-hour display form. Strings that
/// do not parse are returned unchanged rather than erroring in the view.
pub fn format_time_12_hour(time: &str) -> String {
    let Some((hours, minutes)) = time.split_once(':') else {
        return time.to_string();
    };
    let (Ok(h), Ok(m)) = (hours.parse::<u8>(), minutes.parse::<u8>()) else {
        return time.to_string();
    };
    if h > 23 || m > 59 {
        return time.to_string();
    }

    let marker = if h < 12 { "ص" } else { "م" };
    let display_hour = match h % 12 {
        0 => 12,
        other => other,
    };
    format!("{}:{:02} {}", display_hour, m, marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Grade, ScheduleDay};
    use uuid::Uuid;

    fn student() -> Student {
        Student {
            id: Uuid::new_v4(),
            name: "أحمد".to_string(),
            teacher_id: Uuid::new_v4(),
            parent_code: "123456".to_string(),
            parent_phone: Some("0101234567".to_string()),
            logs: Vec::new(),
            payments: Vec::new(),
            schedule: vec![ScheduleDay::default(); 7],
            next_plan: None,
        }
    }

    #[test]
    fn test_format_time_12_hour() {
        assert_eq!(format_time_12_hour("00:05"), "12:05 ص");
        assert_eq!(format_time_12_hour("13:30"), "1:30 م");
        assert_eq!(format_time_12_hour("12:00"), "12:00 م");
        assert_eq!(format_time_12_hour("11:59"), "11:59 ص");
        // Unparseable input passes through.
        assert_eq!(format_time_12_hour("none"), "none");
        assert_eq!(format_time_12_hour("25:00"), "25:00");
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("010-1234-567").unwrap(), "0101234567");
        assert_eq!(normalize_phone("+20 101 234 5678").unwrap(), "201012345678");
        assert!(normalize_phone("12345").is_err());
    }

    #[test]
    fn test_whatsapp_link_encodes_text() {
        let link = whatsapp_link("20", "0101234567", "مرحبا *بكم*");
        assert!(link.starts_with("https://wa.me/20101234567?text="));
        assert!(!link.contains(' '));
        assert!(!link.contains('*'));
    }

    #[test]
    fn test_compose_parent_message_sections() {
        let jadeed = QuranAssignment::Surah {
            name: "الملك".to_string(),
            ayah_from: 1,
            ayah_to: 10,
            grade: Grade::VeryGood,
        };
        let murajaah = vec![
            QuranAssignment::Juz {
                number: 30,
                grade: Grade::Good,
            },
            QuranAssignment::Surah {
                name: "يس".to_string(),
                ayah_from: 1,
                ayah_to: 12,
                grade: Grade::Good,
            },
        ];
        let next = QuranAssignment::Surah {
            name: "الملك".to_string(),
            ayah_from: 11,
            ayah_to: 20,
            grade: Grade::Good,
        };

        let attendance = vec![AttendanceRecord {
            arrival: "16:00".to_string(),
            departure: Some("18:00".to_string()),
        }];
        let message = compose_parent_message(
            &student(),
            &jadeed,
            &murajaah,
            &attendance,
            &next,
            &[],
            Utc::now(),
        );

        assert!(message.contains("أحمد"));
        assert!(message.contains("الحضور: 4:00 م - 6:00 م"));
        assert!(message.contains("*الجديد:*"));
        assert!(message.contains("سورة الملك (1-10)"));
        assert!(message.contains(Grade::VeryGood.label()));
        // Murajaah descriptions are comma-joined on one line.
        assert!(message.contains("الجزء عم، سورة يس (1-12)"));
        // Empty next-murajaah renders the placeholder.
        assert!(message.contains("لا يوجد"));
    }
}
