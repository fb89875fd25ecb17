use crate::models::{Movement, MovementForm, StoredMovement};
use crate::repository::StorageRepository;
use chrono::{NaiveDate, Utc};
use database::{Database, RepositoryError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::instrument;

/// Storage key for the current, versioned layout.
pub const STORAGE_KEY: &str = "misGastos.v2";
/// Key the browser version wrote a bare JSON array to.
pub const LEGACY_STORAGE_KEY: &str = "misGastos";
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum MovementError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Storage error: {0}")]
    Infrastructure(String),
    #[error("Storage quota exceeded")]
    QuotaExceeded,
    #[error("Movement {0} not found")]
    NotFound(i64),
}

impl From<RepositoryError> for MovementError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::CheckViolation(_) => MovementError::QuotaExceeded,
            RepositoryError::Infrastructure(e) => MovementError::Infrastructure(e.to_string()),
            _ => MovementError::Infrastructure(err.to_string()),
        }
    }
}

/// What marking an expense as paid does to its due date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaymentDatePolicy {
    /// Keep `due_date`; the payment day goes to `paid_on`.
    #[default]
    PreserveDueDate,
    /// Replace `due_date` with the payment day (and record it in `paid_on`).
    OverwriteDueDate,
}

impl FromStr for PaymentDatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preserve-due-date" => Ok(PaymentDatePolicy::PreserveDueDate),
            "overwrite-due-date" => Ok(PaymentDatePolicy::OverwriteDueDate),
            other => Err(format!(
                "Unknown payment-date policy '{}' (expected preserve-due-date or overwrite-due-date)",
                other
            )),
        }
    }
}

impl fmt::Display for PaymentDatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentDatePolicy::PreserveDueDate => f.write_str("preserve-due-date"),
            PaymentDatePolicy::OverwriteDueDate => f.write_str("overwrite-due-date"),
        }
    }
}

#[derive(Serialize)]
struct PersistedRef<'a> {
    version: u32,
    #[serde(rename = "movimientos")]
    movements: &'a [Movement],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Persisted {
    Versioned {
        #[allow(dead_code)]
        version: u32,
        #[serde(rename = "movimientos")]
        movements: Vec<serde_json::Value>,
    },
    Legacy(Vec<serde_json::Value>),
}

pub fn encode(movements: &[Movement]) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PersistedRef {
        version: SCHEMA_VERSION,
        movements,
    })
}

/// Decodes either layout into a normalized list. Never fails: a document that
/// cannot be parsed yields an empty list, and broken records are skipped.
pub fn decode(json: &str) -> Vec<Movement> {
    if json.trim().is_empty() {
        return Vec::new();
    }

    let records = match serde_json::from_str::<Persisted>(json) {
        Ok(Persisted::Versioned { movements, .. }) => movements,
        Ok(Persisted::Legacy(movements)) => movements,
        Err(e) => {
            tracing::warn!("Stored movements are unreadable, starting empty: {}", e);
            return Vec::new();
        }
    };

    let mut seen: HashSet<i64> = HashSet::new();
    let mut needs_id: Vec<StoredMovement> = Vec::new();
    let mut movements: Vec<Movement> = Vec::with_capacity(records.len());

    for record in records {
        let stored: StoredMovement = match serde_json::from_value(record) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Skipping malformed stored movement: {}", e);
                continue;
            }
        };

        match stored.stored_id() {
            Some(id) if seen.insert(id) => match stored.into_movement(id) {
                Ok(m) => movements.push(m),
                Err(e) => {
                    seen.remove(&id);
                    tracing::warn!("Skipping stored movement {}: {}", id, e);
                }
            },
            _ => needs_id.push(stored),
        }
    }

    // Records without a usable (or with a duplicate) id get fresh ones after
    // every stored id is known.
    let mut last = movements.iter().map(|m| m.id).max().unwrap_or(0);
    for stored in needs_id {
        let id = fresh_id(last);
        match stored.into_movement(id) {
            Ok(m) => {
                last = id;
                movements.push(m);
            }
            Err(e) => tracing::warn!("Skipping stored movement without id: {}", e),
        }
    }

    movements
}

/// Timestamp-based id strictly greater than `last`.
fn fresh_id(last: i64) -> i64 {
    Utc::now().timestamp_millis().max(last + 1)
}

/// Owns the movement list for the session and keeps storage in step with it.
///
/// Every mutation writes the whole list back before returning. Callers are
/// expected to serialize access (the web layer keeps the store behind a
/// mutex), so there is exactly one writer at a time.
pub struct MovementStore {
    db: Database,
    key: String,
    movements: Vec<Movement>,
    last_id: i64,
    payment_policy: PaymentDatePolicy,
    warning: Option<String>,
}

impl MovementStore {
    /// Reads the list from storage. Falls back to the legacy key when the
    /// current one is absent, and to an empty list on any failure.
    #[instrument(skip(db))]
    pub async fn load(db: Database, key: &str, payment_policy: PaymentDatePolicy) -> Self {
        let raw = match Self::read_raw(&db, key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to read stored movements, starting empty: {}", e);
                None
            }
        };

        let movements = raw.as_deref().map(decode).unwrap_or_default();
        let last_id = movements.iter().map(|m| m.id).max().unwrap_or(0);
        tracing::info!("Loaded {} movements", movements.len());

        Self {
            db,
            key: key.to_string(),
            movements,
            last_id,
            payment_policy,
            warning: None,
        }
    }

    async fn read_raw(db: &Database, key: &str) -> Result<Option<String>, RepositoryError> {
        let mut uow = db.begin().await?;
        let mut repo = StorageRepository::new(uow.connection());

        if let Some(value) = repo.get_item(key).await? {
            return Ok(Some(value));
        }

        let legacy = repo.get_item(LEGACY_STORAGE_KEY).await?;
        if legacy.is_some() {
            tracing::info!("Reading movements from legacy key '{}'", LEGACY_STORAGE_KEY);
        }
        Ok(legacy)
    }

    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    pub fn get(&self, id: i64) -> Option<&Movement> {
        self.movements.iter().find(|m| m.id == id)
    }

    /// The warning left by the last failed save, if any.
    pub fn take_warning(&mut self) -> Option<String> {
        self.warning.take()
    }

    /// Writes the whole list. Failures are logged and kept as a warning; they
    /// never abort the mutation that triggered the save.
    #[instrument(skip(self), fields(count = self.movements.len()))]
    pub async fn save(&mut self) {
        if let Err(e) = self.write().await {
            let message = match e {
                MovementError::QuotaExceeded => {
                    "Storage quota exceeded; changes are kept only for this session".to_string()
                }
                other => format!("Could not persist movements: {}", other),
            };
            tracing::warn!("{}", message);
            self.warning = Some(message);
        }
    }

    async fn write(&self) -> Result<(), MovementError> {
        let json = encode(&self.movements)
            .map_err(|e| MovementError::Infrastructure(e.to_string()))?;

        let mut uow = self.db.begin().await?;
        let mut repo = StorageRepository::new(uow.connection());
        repo.set_item(&self.key, &json).await?;
        uow.commit().await?;
        Ok(())
    }

    fn position(&self, id: i64) -> Result<usize, MovementError> {
        self.movements
            .iter()
            .position(|m| m.id == id)
            .ok_or(MovementError::NotFound(id))
    }

    /// Appends a new, unpaid movement and returns its id.
    #[instrument(skip(self))]
    pub async fn add(&mut self, form: MovementForm) -> i64 {
        let id = fresh_id(self.last_id);
        self.last_id = id;

        self.movements.push(Movement {
            id,
            kind: form.kind(),
            description: form.description().to_string(),
            amount: form.amount(),
            due_date: form.due_date().to_string(),
            category: form.category(),
            paid: false,
            paid_on: None,
        });

        self.save().await;
        id
    }

    /// Replaces every field but `id` and the payment status.
    #[instrument(skip(self))]
    pub async fn update(&mut self, id: i64, form: MovementForm) -> Result<(), MovementError> {
        let index = self.position(id)?;
        let paid = self.movements[index].paid;
        let paid_on = self.movements[index].paid_on.take();

        self.movements[index] = Movement {
            id,
            kind: form.kind(),
            description: form.description().to_string(),
            amount: form.amount(),
            due_date: form.due_date().to_string(),
            category: form.category(),
            paid,
            paid_on,
        };

        self.save().await;
        Ok(())
    }

    /// Marks an expense paid. Returns `false` (and touches nothing) when it
    /// already was.
    #[instrument(skip(self))]
    pub async fn mark_paid(&mut self, id: i64, today: NaiveDate) -> Result<bool, MovementError> {
        let index = self.position(id)?;
        let policy = self.payment_policy;
        let movement = &mut self.movements[index];

        if !movement.is_expense() {
            return Err(MovementError::InvalidInput("Only expenses can be marked as paid".into()));
        }
        if movement.paid {
            return Ok(false);
        }

        let stamp = today.format("%Y-%m-%d").to_string();
        movement.paid = true;
        if policy == PaymentDatePolicy::OverwriteDueDate {
            movement.due_date = stamp.clone();
        }
        movement.paid_on = Some(stamp);

        self.save().await;
        Ok(true)
    }

    /// Deletes a movement. Confirmation is the caller's job.
    #[instrument(skip(self))]
    pub async fn remove(&mut self, id: i64) -> Result<Movement, MovementError> {
        let index = self.position(id)?;
        let removed = self.movements.remove(index);

        self.save().await;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, MovementKind, RawMovementForm};
    use crate::views::{pending, paid, Dashboard, Summary, TotalSpentPolicy, Urgency};
    use chrono::{Duration, Local};
    use database::get_test_db;

    fn form(kind: &str, description: &str, amount: &str, due: &str, category: &str) -> MovementForm {
        MovementForm::new(RawMovementForm {
            kind: kind.into(),
            description: description.into(),
            amount: amount.into(),
            due_date: due.into(),
            category: category.into(),
        })
        .unwrap()
    }

    fn iso(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    async fn stored_value(db: &Database, key: &str) -> Option<String> {
        let mut uow = db.begin().await.unwrap();
        let mut repo = StorageRepository::new(uow.connection());
        repo.get_item(key).await.unwrap()
    }

    async fn put_value(db: &Database, key: &str, value: &str) {
        let mut uow = db.begin().await.unwrap();
        let mut repo = StorageRepository::new(uow.connection());
        repo.set_item(key, value).await.unwrap();
        uow.commit().await.unwrap();
    }

    async fn empty_store() -> (Database, MovementStore) {
        let db = get_test_db().await;
        let store = MovementStore::load(db.clone(), STORAGE_KEY, PaymentDatePolicy::default()).await;
        (db, store)
    }

    #[tokio::test]
    async fn test_load_empty_storage() {
        let (_db, store) = empty_store().await;
        assert!(store.movements().is_empty());
    }

    #[tokio::test]
    async fn test_load_unreadable_storage_fails_open() {
        let db = get_test_db().await;
        put_value(&db, STORAGE_KEY, "{not json").await;

        let store = MovementStore::load(db, STORAGE_KEY, PaymentDatePolicy::default()).await;
        assert!(store.movements().is_empty());
    }

    #[tokio::test]
    async fn test_load_legacy_key_and_normalize() {
        let db = get_test_db().await;
        put_value(
            &db,
            LEGACY_STORAGE_KEY,
            r#"[
                {"id": 1700000000000, "tipo": "gasto", "descripcion": "Luz", "monto": 45.5, "fechaVencimiento": "2025-01-10", "categoria": "fijo"},
                {"tipo": "gasto", "descripcion": "Cine", "monto": 12, "fechaVencimiento": "", "categoria": "ocio", "pagado": true},
                {"id": 1700000000000, "tipo": "ingreso", "descripcion": "Nómina", "monto": 1500, "fechaVencimiento": "2025-01-01"},
                "garbage"
            ]"#,
        )
        .await;

        let store = MovementStore::load(db.clone(), STORAGE_KEY, PaymentDatePolicy::default()).await;
        let list = store.movements();
        assert_eq!(list.len(), 3);

        let luz = store.get(1700000000000).unwrap();
        assert_eq!(luz.description, "Luz");
        assert_eq!(luz.amount, 4550);
        assert!(!luz.paid);

        let cine = list.iter().find(|m| m.description == "Cine").unwrap();
        assert!(cine.paid);
        assert_eq!(cine.category, Some(Category::Leisure));

        let nomina = list.iter().find(|m| m.description == "Nómina").unwrap();
        assert_eq!(nomina.kind, MovementKind::Income);

        let unique: HashSet<i64> = list.iter().map(|m| m.id).collect();
        assert_eq!(unique.len(), 3);

        // Legacy data is left alone until the first save.
        assert!(stored_value(&db, STORAGE_KEY).await.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let (db, mut store) = empty_store().await;
        let rent = store.add(form("gasto", "Rent", "500", "2026-01-05", "fijo")).await;
        let salary = store.add(form("ingreso", "Salary", "1500.25", "2026-01-01", "")).await;
        store.mark_paid(rent, NaiveDate::from_ymd_opt(2026, 1, 4).unwrap()).await.unwrap();

        let raw = stored_value(&db, STORAGE_KEY).await.unwrap();
        assert!(raw.contains("\"version\":2"));

        let reloaded = MovementStore::load(db, STORAGE_KEY, PaymentDatePolicy::default()).await;
        assert_eq!(reloaded.movements(), store.movements());
        assert!(reloaded.get(rent).unwrap().paid);
        assert_eq!(reloaded.get(salary).unwrap().amount, 150025);
    }

    #[tokio::test]
    async fn test_add_assigns_unique_increasing_ids() {
        let (_db, mut store) = empty_store().await;
        let a = store.add(form("gasto", "A", "1", "", "fijo")).await;
        let b = store.add(form("gasto", "B", "1", "", "fijo")).await;
        let c = store.add(form("gasto", "C", "1", "", "fijo")).await;

        assert!(a < b && b < c);
        assert!(store.movements().iter().all(|m| !m.paid));
    }

    #[tokio::test]
    async fn test_removed_id_is_not_reused() {
        let (_db, mut store) = empty_store().await;
        let a = store.add(form("gasto", "A", "1", "", "fijo")).await;
        store.remove(a).await.unwrap();
        let b = store.add(form("gasto", "B", "1", "", "fijo")).await;

        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_mark_paid_is_idempotent() {
        let (_db, mut store) = empty_store().await;
        let id = store.add(form("gasto", "Rent", "500", "2026-01-05", "fijo")).await;
        let first_day = NaiveDate::from_ymd_opt(2026, 1, 4).unwrap();
        let second_day = NaiveDate::from_ymd_opt(2026, 1, 9).unwrap();

        assert!(store.mark_paid(id, first_day).await.unwrap());
        let after_first = store.get(id).unwrap().clone();

        assert!(!store.mark_paid(id, second_day).await.unwrap());
        assert_eq!(store.get(id).unwrap(), &after_first);
        assert_eq!(after_first.paid_on.as_deref(), Some("2026-01-04"));
        assert_eq!(after_first.due_date, "2026-01-05");
    }

    #[tokio::test]
    async fn test_mark_paid_overwrite_policy() {
        let db = get_test_db().await;
        let mut store = MovementStore::load(db, STORAGE_KEY, PaymentDatePolicy::OverwriteDueDate).await;
        let id = store.add(form("gasto", "Rent", "500", "2026-01-05", "fijo")).await;

        store.mark_paid(id, NaiveDate::from_ymd_opt(2026, 1, 2).unwrap()).await.unwrap();
        let m = store.get(id).unwrap();
        assert_eq!(m.due_date, "2026-01-02");
        assert_eq!(m.paid_on.as_deref(), Some("2026-01-02"));
    }

    #[tokio::test]
    async fn test_mark_paid_rejects_income() {
        let (_db, mut store) = empty_store().await;
        let id = store.add(form("ingreso", "Salary", "1500", "", "")).await;

        let result = store.mark_paid(id, Local::now().date_naive()).await;
        assert!(matches!(result, Err(MovementError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_unknown_id_reports_not_found() {
        let (_db, mut store) = empty_store().await;
        store.add(form("gasto", "A", "1", "", "fijo")).await;
        let before = store.movements().to_vec();

        let today = Local::now().date_naive();
        assert!(matches!(store.update(42, form("gasto", "X", "1", "", "fijo")).await, Err(MovementError::NotFound(42))));
        assert!(matches!(store.mark_paid(42, today).await, Err(MovementError::NotFound(42))));
        assert!(matches!(store.remove(42).await, Err(MovementError::NotFound(42))));
        assert_eq!(store.movements(), before.as_slice());
    }

    #[tokio::test]
    async fn test_edit_preserves_payment_state() {
        let (_db, mut store) = empty_store().await;
        let id = store.add(form("gasto", "Rent", "500", "2026-01-05", "fijo")).await;
        store.mark_paid(id, NaiveDate::from_ymd_opt(2026, 1, 4).unwrap()).await.unwrap();

        store.update(id, form("gasto", "Rent (new flat)", "650", "2026-02-05", "fijo")).await.unwrap();

        let m = store.get(id).unwrap();
        assert!(m.paid);
        assert_eq!(m.paid_on.as_deref(), Some("2026-01-04"));
        assert_eq!(m.description, "Rent (new flat)");
        assert_eq!(m.amount, 65000);
        assert_eq!(m.due_date, "2026-02-05");
    }

    #[tokio::test]
    async fn test_totals_are_conserved() {
        let (_db, mut store) = empty_store().await;
        let a = store.add(form("gasto", "A", "10", "", "fijo")).await;
        let b = store.add(form("gasto", "B", "20.5", "", "variable")).await;
        store.add(form("ingreso", "C", "1000", "", "")).await;
        let d = store.add(form("gasto", "D", "7", "", "ocio")).await;
        store.mark_paid(a, Local::now().date_naive()).await.unwrap();
        store.update(b, form("gasto", "B", "30", "", "variable")).await.unwrap();
        store.remove(d).await.unwrap();

        let summary = Summary::compute(store.movements(), TotalSpentPolicy::PaidOnly);
        let expense_sum: i64 = store.movements().iter().filter(|m| m.is_expense()).map(|m| m.amount).sum();
        assert_eq!(summary.pending_total + summary.paid_total, expense_sum);
        assert_eq!(expense_sum, 4000);
    }

    #[tokio::test]
    async fn test_rent_scenario() {
        let (_db, mut store) = empty_store().await;
        let today = Local::now().date_naive();
        let id = store.add(form("gasto", "Rent", "500", &iso(today + Duration::days(3)), "fijo")).await;

        let before = Dashboard::build(store.movements(), today, TotalSpentPolicy::PaidOnly);
        assert_eq!(before.summary.totals.pending_total, 50000);
        assert_eq!(before.summary.totals.paid_total, 0);
        assert_eq!(before.pending[0].urgency, Urgency::DueSoon);

        store.mark_paid(id, today).await.unwrap();

        let after = Dashboard::build(store.movements(), today, TotalSpentPolicy::PaidOnly);
        assert_eq!(after.summary.pending_total, "0,00");
        assert_eq!(after.summary.paid_total, "500,00");
        assert!(after.pending.is_empty());
        assert_eq!(after.paid.len(), 1);
        assert_eq!(after.paid[0].id, id);
        assert_eq!(after.paid[0].urgency, Urgency::Normal);
    }

    #[tokio::test]
    async fn test_overdue_scenario() {
        let (_db, mut store) = empty_store().await;
        let today = Local::now().date_naive();
        store.add(form("gasto", "Phone", "30", &iso(today - Duration::days(10)), "fijo")).await;

        let rows = pending(store.movements(), today);
        assert_eq!(rows.len(), 1);
        let dashboard = Dashboard::build(store.movements(), today, TotalSpentPolicy::PaidOnly);
        assert_eq!(dashboard.pending[0].urgency, Urgency::Overdue);
        assert!(paid(store.movements()).is_empty());
    }

    #[tokio::test]
    async fn test_delete_scenario() {
        let (db, mut store) = empty_store().await;
        let first = store.add(form("gasto", "First", "1", "", "fijo")).await;
        let second = store.add(form("gasto", "Second", "2", "", "variable")).await;

        let removed = store.remove(first).await.unwrap();
        assert_eq!(removed.id, first);
        assert_eq!(store.movements().len(), 1);
        assert_eq!(store.movements()[0].id, second);

        let persisted = decode(&stored_value(&db, STORAGE_KEY).await.unwrap());
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].id, second);
    }

    #[tokio::test]
    async fn test_save_over_quota_is_a_warning() {
        let (db, mut store) = empty_store().await;
        let huge = "x".repeat(120);
        store.add(form("gasto", &huge, "1", "", "fijo")).await;
        assert!(store.take_warning().is_none());

        // Push the document past the quota directly.
        store.movements[0].description = "x".repeat(5 * 1024 * 1024);
        store.save().await;

        assert!(store.take_warning().is_some());
        assert_eq!(store.movements().len(), 1);
        let persisted = decode(&stored_value(&db, STORAGE_KEY).await.unwrap());
        assert_eq!(persisted[0].description, huge);
    }

    #[test]
    fn test_decode_accepts_both_layouts() {
        let legacy = decode(r#"[{"id": 1, "tipo": "gasto", "descripcion": "A", "monto": 1}]"#);
        let versioned = decode(r#"{"version": 2, "movimientos": [{"id": 1, "tipo": "gasto", "descripcion": "A", "monto": 1}]}"#);
        assert_eq!(legacy, versioned);
        assert_eq!(legacy.len(), 1);
        assert!(decode("").is_empty());
        assert!(decode("null").is_empty());
    }

    #[test]
    fn test_decode_skips_oversized_amount_and_reassigns_fractional_id() {
        let list = decode(
            r#"[
                {"id": 1, "tipo": "gasto", "descripcion": "Yacht", "monto": 1e18},
                {"id": 2.5, "tipo": "gasto", "descripcion": "Pan", "monto": 1.2}
            ]"#,
        );

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].description, "Pan");
        assert_ne!(list[0].id, 2);
        assert_eq!(list[0].amount, 120);
    }
}
