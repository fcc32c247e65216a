//! Canonical Quran reference data: the 114 surahs with their verse counts
//! and the fixed 30-entry juz list. Assignment validation at the API
//! boundary checks ayah ranges against this table.

/// (name, verse count), in mushaf order.
pub const SURAHS: [(&str, u16); 114] = [
    ("الفاتحة", 7),
    ("البقرة", 286),
    ("آل عمران", 200),
    ("النساء", 176),
    ("المائدة", 120),
    ("الأنعام", 165),
    ("الأعراف", 206),
    ("الأنفال", 75),
    ("التوبة", 129),
    ("يونس", 109),
    ("هود", 123),
    ("يوسف", 111),
    ("الرعد", 43),
    ("إبراهيم", 52),
    ("الحجر", 99),
    ("النحل", 128),
    ("الإسراء", 111),
    ("الكهف", 110),
    ("مريم", 98),
    ("طه", 135),
    ("الأنبياء", 112),
    ("الحج", 78),
    ("المؤمنون", 118),
    ("النور", 64),
    ("الفرقان", 77),
    ("الشعراء", 227),
    ("النمل", 93),
    ("القصص", 88),
    ("العنكبوت", 69),
    ("الروم", 60),
    ("لقمان", 34),
    ("السجدة", 30),
    ("الأحزاب", 73),
    ("سبأ", 54),
    ("فاطر", 45),
    ("يس", 83),
    ("الصافات", 182),
    ("ص", 88),
    ("الزمر", 75),
    ("غافر", 85),
    ("فصلت", 54),
    ("الشورى", 53),
    ("الزخرف", 89),
    ("الدخان", 59),
    ("الجاثية", 37),
    ("الأحقاف", 35),
    ("محمد", 38),
    ("الفتح", 29),
    ("الحجرات", 18),
    ("ق", 45),
    ("الذاريات", 60),
    ("الطور", 49),
    ("النجم", 62),
    ("القمر", 55),
    ("الرحمن", 78),
    ("الواقعة", 96),
    ("الحديد", 29),
    ("المجادلة", 22),
    ("الحشر", 24),
    ("الممتحنة", 13),
    ("الصف", 14),
    ("الجمعة", 11),
    ("المنافقون", 11),
    ("التغابن", 18),
    ("الطلاق", 12),
    ("التحريم", 12),
    ("الملك", 30),
    ("القلم", 52),
    ("الحاقة", 52),
    ("المعارج", 44),
    ("نوح", 28),
    ("الجن", 28),
    ("المزمل", 20),
    ("المدثر", 56),
    ("القيامة", 40),
    ("الإنسان", 31),
    ("المرسلات", 50),
    ("النبأ", 40),
    ("النازعات", 46),
    ("عبس", 42),
    ("التكوير", 29),
    ("الانفطار", 19),
    ("المطففين", 36),
    ("الانشقاق", 25),
    ("البروج", 22),
    ("الطارق", 17),
    ("الأعلى", 19),
    ("الغاشية", 26),
    ("الفجر", 30),
    ("البلد", 20),
    ("الشمس", 15),
    ("الليل", 21),
    ("الضحى", 11),
    ("الشرح", 8),
    ("التين", 8),
    ("العلق", 19),
    ("القدر", 5),
    ("البينة", 8),
    ("الزلزلة", 8),
    ("العاديات", 11),
    ("القارعة", 11),
    ("التكاثر", 8),
    ("العصر", 3),
    ("الهمزة", 9),
    ("الفيل", 5),
    ("قريش", 4),
    ("الماعون", 7),
    ("الكوثر", 3),
    ("الكافرون", 6),
    ("النصر", 3),
    ("المسد", 5),
    ("الإخلاص", 4),
    ("الفلق", 5),
    ("الناس", 6),
];

/// Traditional juz names, by opening words.
pub const JUZ_NAMES: [&str; 30] = [
    "الم",
    "سيقول",
    "تلك الرسل",
    "لن تنالوا",
    "والمحصنات",
    "لا يحب الله",
    "وإذا سمعوا",
    "ولو أننا",
    "قال الملأ",
    "واعلموا",
    "يعتذرون",
    "وما من دابة",
    "وما أبرئ",
    "ربما",
    "سبحان الذي",
    "قال ألم",
    "اقترب للناس",
    "قد أفلح",
    "وقال الذين",
    "أمن خلق",
    "اتل ما أوحي",
    "ومن يقنت",
    "وما لي",
    "فمن أظلم",
    "إليه يرد",
    "حم",
    "قال فما خطبكم",
    "قد سمع الله",
    "تبارك الذي",
    "عم",
];

/// Verse count for a surah name, if the name is canonical.
pub fn verse_count(name: &str) -> Option<u16> {
    SURAHS
        .iter()
        .find(|(surah, _)| *surah == name)
        .map(|(_, count)| *count)
}

/// Name of juz `number` (1-based). Out-of-range numbers fall back to the
/// bare number so display never panics on bad stored data.
pub fn juz_name(number: u8) -> String {
    if (1..=30).contains(&number) {
        JUZ_NAMES[number as usize - 1].to_string()
    } else {
        number.to_string()
    }
}

/// Inline validation message for an ayah range, `None` when acceptable.
/// Unknown surah names pass: the teacher form allows free-text names and
/// the range invariant is expected, not enforced.
pub fn validate_ayah_range(name: &str, from: u16, to: u16) -> Option<String> {
    if from < 1 {
        return Some("رقم الآية يبدأ من 1".to_string());
    }
    if from > to {
        return Some(format!("نطاق آيات غير صالح: {} > {}", from, to));
    }
    if let Some(count) = verse_count(name) {
        if to > count {
            return Some(format!("سورة {} تنتهي عند الآية {}", name, count));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_shape() {
        assert_eq!(SURAHS.len(), 114);
        assert_eq!(JUZ_NAMES.len(), 30);
        assert_eq!(SURAHS[0], ("الفاتحة", 7));
        assert_eq!(SURAHS[113], ("الناس", 6));
    }

    #[test]
    fn test_verse_count_lookup() {
        assert_eq!(verse_count("البقرة"), Some(286));
        assert_eq!(verse_count("الكوثر"), Some(3));
        assert_eq!(verse_count("not a surah"), None);
    }

    #[test]
    fn test_juz_name_bounds() {
        assert_eq!(juz_name(1), "الم");
        assert_eq!(juz_name(30), "عم");
        assert_eq!(juz_name(0), "0");
        assert_eq!(juz_name(31), "31");
    }

    #[test]
    fn test_validate_ayah_range() {
        assert_eq!(validate_ayah_range("الفاتحة", 1, 7), None);
        assert!(validate_ayah_range("الفاتحة", 0, 7).is_some());
        assert!(validate_ayah_range("الفاتحة", 5, 3).is_some());
        assert!(validate_ayah_range("الفاتحة", 1, 8).is_some());
        // Unknown names only get the ordering check.
        assert_eq!(validate_ayah_range("مجهولة", 1, 999), None);
    }
}
