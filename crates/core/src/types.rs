/// Equipment identifiers come from the hierarchy provider verbatim.
pub type EquipmentId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
