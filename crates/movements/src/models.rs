use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Whether a movement takes money out (`gasto`) or brings it in (`ingreso`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementKind {
    #[serde(rename = "gasto", alias = "expense")]
    Expense,
    #[serde(rename = "ingreso", alias = "income")]
    Income,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Expense => "gasto",
            MovementKind::Income => "ingreso",
        }
    }
}

impl FromStr for MovementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "gasto" | "expense" => Ok(MovementKind::Expense),
            "ingreso" | "income" => Ok(MovementKind::Income),
            other => Err(format!("Unknown movement type '{}'", other)),
        }
    }
}

/// Bucket a movement renders into. Incomes may carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "fijo", alias = "fixed")]
    Fixed,
    #[serde(rename = "variable")]
    Variable,
    #[serde(rename = "ocio", alias = "leisure")]
    Leisure,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Fixed => "fijo",
            Category::Variable => "variable",
            Category::Leisure => "ocio",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fijo" | "fixed" => Ok(Category::Fixed),
            "variable" => Ok(Category::Variable),
            "ocio" | "leisure" => Ok(Category::Leisure),
            other => Err(format!("Unknown category '{}'", other)),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single recorded expense or income.
///
/// Serialized with the field names the browser version wrote to local storage,
/// so previously persisted lists keep loading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Movement {
    pub id: i64,
    #[serde(rename = "tipo")]
    pub kind: MovementKind,
    #[serde(rename = "descripcion")]
    pub description: String,
    #[serde(rename = "monto", serialize_with = "cents_as_decimal")]
    pub amount: i64, // Cents
    #[serde(rename = "fechaVencimiento")]
    pub due_date: String, // 'YYYY-MM-DD' or empty
    #[serde(rename = "categoria", skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(rename = "pagado")]
    pub paid: bool,
    #[serde(rename = "fechaPago", skip_serializing_if = "Option::is_none")]
    pub paid_on: Option<String>, // 'YYYY-MM-DD'
}

impl Movement {
    pub fn is_expense(&self) -> bool {
        self.kind == MovementKind::Expense
    }

    /// An expense that still has to be paid.
    pub fn is_pending(&self) -> bool {
        self.is_expense() && !self.paid
    }
}

/// Largest accepted amount: 100.000.000.000,00.
pub const MAX_AMOUNT_CENTS: i64 = 10_000_000_000_000;

// Integers above this do not survive a round trip through an f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn cents_to_decimal(cents: i64) -> f64 {
    cents as f64 / 100.0
}

pub fn decimal_to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn cents_as_decimal<S: Serializer>(cents: &i64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(cents_to_decimal(*cents))
}

/// A movement exactly as found in storage, before normalization.
///
/// Every field is optional because older revisions wrote fewer fields, and
/// `JSON.stringify(NaN)` left `null` amounts behind.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoredMovement {
    pub id: Option<serde_json::Value>,
    #[serde(rename = "tipo")]
    pub kind: Option<String>,
    #[serde(rename = "descripcion")]
    pub description: Option<String>,
    #[serde(rename = "monto")]
    pub amount: Option<f64>,
    #[serde(rename = "fechaVencimiento")]
    pub due_date: Option<String>,
    #[serde(rename = "categoria")]
    pub category: Option<String>,
    #[serde(rename = "pagado")]
    pub paid: Option<bool>,
    #[serde(rename = "fechaPago")]
    pub paid_on: Option<String>,
}

impl StoredMovement {
    /// The stored id when it is usable as an integer.
    pub fn stored_id(&self) -> Option<i64> {
        match self.id.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER)
                    .map(|f| f as i64)
            }),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Builds the in-memory movement, filling legacy gaps. `id` is decided by the caller.
    pub fn into_movement(self, id: i64) -> Result<Movement, String> {
        let kind = match self.kind.as_deref() {
            None => MovementKind::Expense,
            Some(raw) => raw.parse()?,
        };

        let amount = match self.amount.filter(|a| a.is_finite()) {
            None => 0,
            Some(a) if a * 100.0 > MAX_AMOUNT_CENTS as f64 => {
                return Err(format!("Amount {} exceeds the maximum", a));
            }
            Some(a) => decimal_to_cents(a).max(0),
        };

        Ok(Movement {
            id,
            kind,
            description: self.description.unwrap_or_default(),
            amount,
            due_date: self.due_date.unwrap_or_default(),
            category: self.category.as_deref().and_then(|c| c.parse().ok()),
            paid: self.paid.unwrap_or(false),
            paid_on: self.paid_on.filter(|d| !d.is_empty()),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AmountField {
    Number(f64),
    Text(String),
}

fn amount_from_number_or_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match AmountField::deserialize(deserializer)? {
        AmountField::Number(n) => n.to_string(),
        AmountField::Text(s) => s,
    })
}

fn default_kind() -> String {
    MovementKind::Expense.as_str().to_string()
}

fn default_category() -> String {
    Category::Fixed.as_str().to_string()
}

/// Field values as the movement form submits them (and as it is pre-filled).
///
/// An empty `categoria` means "no category"; an absent one means `fijo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RawMovementForm {
    #[serde(rename = "tipo", default = "default_kind")]
    pub kind: String,
    #[serde(rename = "descripcion", default)]
    #[validate(length(min = 1, max = 120))]
    pub description: String,
    #[serde(rename = "monto", default, deserialize_with = "amount_from_number_or_text")]
    pub amount: String,
    #[serde(rename = "fechaVencimiento", default)]
    pub due_date: String,
    #[serde(rename = "categoria", default = "default_category")]
    pub category: String,
}

impl RawMovementForm {
    /// Values for a brand-new movement.
    pub fn blank() -> Self {
        Self {
            kind: default_kind(),
            description: String::new(),
            amount: String::new(),
            due_date: String::new(),
            category: default_category(),
        }
    }
}

impl From<&Movement> for RawMovementForm {
    fn from(movement: &Movement) -> Self {
        Self {
            kind: movement.kind.as_str().to_string(),
            description: movement.description.clone(),
            amount: format!("{:.2}", cents_to_decimal(movement.amount)),
            due_date: movement.due_date.clone(),
            category: movement
                .category
                .map(|c| c.as_str().to_string())
                .unwrap_or_default(),
        }
    }
}

/// A validated create/edit request. Once built through `new()` it is safe to store.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementForm {
    kind: MovementKind,
    description: String,
    amount: i64,
    due_date: String,
    category: Option<Category>,
}

impl MovementForm {
    pub fn new(raw: RawMovementForm) -> Result<Self, String> {
        raw.validate()
            .map_err(|_| "Description must be between 1 and 120 characters".to_string())?;

        let description = raw.description.trim().to_string();
        if description.is_empty() {
            return Err("Description cannot be empty".to_string());
        }

        let kind: MovementKind = raw.kind.parse()?;
        let amount = parse_amount(&raw.amount)?;

        let due_date = raw.due_date.trim().to_string();
        if !due_date.is_empty() && NaiveDate::parse_from_str(&due_date, "%Y-%m-%d").is_err() {
            return Err("Invalid date format, expected YYYY-MM-DD".to_string());
        }

        let category = match raw.category.trim() {
            "" => None,
            other => Some(other.parse()?),
        };

        Ok(Self {
            kind,
            description,
            amount,
            due_date,
            category,
        })
    }

    pub fn kind(&self) -> MovementKind {
        self.kind
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn due_date(&self) -> &str {
        &self.due_date
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }
}

/// Parses a user-typed amount into cents. Rejects anything that is not a
/// finite, non-negative number; both `.` and `,` work as decimal separator.
pub fn parse_amount(input: &str) -> Result<i64, String> {
    let normalized = input.trim().replace(',', ".");
    if normalized.is_empty() {
        return Err("Amount is required".to_string());
    }

    let value: f64 = normalized
        .parse()
        .map_err(|_| format!("Amount '{}' is not a number", input.trim()))?;

    if !value.is_finite() {
        return Err("Amount must be a finite number".to_string());
    }
    if value < 0.0 {
        return Err("Amount cannot be negative".to_string());
    }
    if value * 100.0 > MAX_AMOUNT_CENTS as f64 {
        return Err("Amount is too large".to_string());
    }

    Ok(decimal_to_cents(value))
}
