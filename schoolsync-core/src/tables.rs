//! Names of the backend tables the realtime layer watches.

pub const STUDENTS: &str = "students";
pub const CLASSES: &str = "classes";
pub const SESSIONS: &str = "sessions";
pub const ATTENDANCE: &str = "attendance";
pub const HOMEWORK: &str = "homework";
pub const STUDENT_STICKERS: &str = "student_stickers";
pub const STUDENT_TROPHIES: &str = "student_trophies";
pub const STUDENT_ACHIEVEMENTS: &str = "student_achievements";
