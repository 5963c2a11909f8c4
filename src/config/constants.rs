// * Configuration Constants
// * Central location for thresholds, timeouts and portal markers

// * Navigation timeout per registration number in milliseconds
pub const NAVIGATION_TIMEOUT_MS: u64 = 60_000;

// * Upper bound for the data-completeness polling loop
pub const SETTLE_TIMEOUT_MS: u64 = 15_000;

// * Re-check cadence inside the polling loop
pub const POLL_INTERVAL_MS: u64 = 500;

// * Grace period after the load event before the first snapshot
pub const SETTLE_DELAY_MS: u64 = 500;

// * Default navigation pacing towards a single portal
pub const NAVIGATIONS_PER_SECOND: u32 = 2;

pub const VIEWPORT_WIDTH: u32 = 1280;
pub const VIEWPORT_HEIGHT: u32 = 720;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

// * Placeholder replaced by the decimal registration number
pub const REG_TOKEN: &str = "{REG}";

// * Sentinel for "score not present on this scrape"
pub const NA: &str = "NA";

pub const PASS: &str = "PASS";

// * Course is not printed by either portal layout
pub const DEFAULT_COURSE: &str = "B.Tech";

// * Legacy (ASP.NET) portal element ids
pub const LEGACY_GRID_ID: &str = "ContentPlaceHolder1_GridView3";
pub const LEGACY_NAME_ID: &str = "ContentPlaceHolder1_DataList1_StudentNameLabel_0";
pub const LEGACY_FATHER_ID: &str = "ContentPlaceHolder1_DataList1_FatherNameLabel_0";
pub const LEGACY_MOTHER_ID: &str = "ContentPlaceHolder1_DataList1_MotherNameLabel_0";
pub const LEGACY_COURSE_ID: &str = "ContentPlaceHolder1_DataList1_CourseLabel_0";
pub const LEGACY_EXAM_NAME_ID: &str = "ContentPlaceHolder1_DataList2_Exam_Name_0";
pub const LEGACY_REMARK_ID: &str = "ContentPlaceHolder1_DataList3_remarkLabel_0";
