//! DDS topic names used by the printer and the layerkit daemon.

/// GPIO key events and settings messages
pub const X1PLUS: &str = "device/x1plus";

/// Print progress and state reports (`push_status`)
pub const PRINT_REPORT: &str = "device/report/print";

/// Version and device info reports (`get_version`)
pub const INFO_REPORT: &str = "device/report/info";

/// Motion controller reports (mesh and vibration calibration data)
pub const MC_PRINT_REPORT: &str = "device/report/mc_print";

/// Print requests: gcode lines, gcode files, status pushes
pub const PRINT_REQUEST: &str = "device/request/print";

/// Info requests
pub const INFO_REQUEST: &str = "device/request/info";

/// Firmware upgrade requests
pub const UPGRADE_REQUEST: &str = "device/request/upgrade";
