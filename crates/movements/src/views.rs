//! Pure projections over the movement list. Nothing here holds state: every
//! view is recomputed from the list it is given.

use crate::format::{format_amount, format_date};
use crate::models::{Category, Movement, MovementKind};
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Pending rows due within this many days are flagged as due soon.
pub const DUE_SOON_DAYS: i64 = 5;

/// What "total spent" means on the summary cards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TotalSpentPolicy {
    /// Money actually paid out.
    #[default]
    PaidOnly,
    /// Paid plus still pending.
    Committed,
}

impl FromStr for TotalSpentPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid-only" => Ok(TotalSpentPolicy::PaidOnly),
            "committed" => Ok(TotalSpentPolicy::Committed),
            other => Err(format!("Unknown total-spent policy '{}' (expected paid-only or committed)", other)),
        }
    }
}

impl fmt::Display for TotalSpentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TotalSpentPolicy::PaidOnly => f.write_str("paid-only"),
            TotalSpentPolicy::Committed => f.write_str("committed"),
        }
    }
}

pub fn parse_due_date(due_date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(due_date.trim(), "%Y-%m-%d").ok()
}

/// Whole days from `today` until `due_date`; `None` when there is no usable date.
pub fn days_remaining(due_date: &str, today: NaiveDate) -> Option<i64> {
    parse_due_date(due_date).map(|due| (due - today).num_days())
}

// Undated rows go after every real date.
fn ascending_days_key(days: Option<i64>) -> (bool, i64) {
    (days.is_none(), days.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Urgency {
    Overdue,
    DueSoon,
    Normal,
}

impl Urgency {
    /// Undated rows are never urgent.
    pub fn classify(days: Option<i64>) -> Self {
        match days {
            Some(d) if d <= 0 => Urgency::Overdue,
            Some(d) if d <= DUE_SOON_DAYS => Urgency::DueSoon,
            _ => Urgency::Normal,
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Urgency::Overdue => "alerta-vencido",
            Urgency::DueSoon => "alerta-proximo",
            Urgency::Normal => "",
        }
    }
}

/// Totals in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub pending_total: i64,
    pub paid_total: i64,
    pub total_spent: i64,
    pub income_total: i64,
    pub balance: i64,
}

impl Summary {
    /// Sums saturate instead of overflowing.
    pub fn compute(movements: &[Movement], policy: TotalSpentPolicy) -> Self {
        let mut pending_total: i64 = 0;
        let mut paid_total: i64 = 0;
        let mut income_total: i64 = 0;

        for m in movements {
            let total = match m.kind {
                MovementKind::Expense if m.paid => &mut paid_total,
                MovementKind::Expense => &mut pending_total,
                MovementKind::Income => &mut income_total,
            };
            *total = total.saturating_add(m.amount);
        }

        let total_spent = match policy {
            TotalSpentPolicy::PaidOnly => paid_total,
            TotalSpentPolicy::Committed => pending_total.saturating_add(paid_total),
        };

        Self {
            pending_total,
            paid_total,
            total_spent,
            income_total,
            balance: income_total.saturating_sub(paid_total),
        }
    }
}

/// Unpaid expenses, soonest due first. Overdue rows lead; undated rows trail.
pub fn pending(movements: &[Movement], today: NaiveDate) -> Vec<&Movement> {
    let mut rows: Vec<&Movement> = movements.iter().filter(|m| m.is_pending()).collect();
    rows.sort_by_key(|m| ascending_days_key(days_remaining(&m.due_date, today)));
    rows
}

/// Paid expenses in list order.
pub fn paid(movements: &[Movement]) -> Vec<&Movement> {
    movements.iter().filter(|m| m.is_expense() && m.paid).collect()
}

/// Every movement, pending expenses first; each group by days remaining.
pub fn attention_order(movements: &[Movement], today: NaiveDate) -> Vec<&Movement> {
    let mut rows: Vec<&Movement> = movements.iter().collect();
    rows.sort_by_key(|m| {
        (
            !m.is_pending(),
            ascending_days_key(days_remaining(&m.due_date, today)),
        )
    });
    rows
}

fn date_descending(a: &Movement, b: &Movement) -> Ordering {
    match (parse_due_date(&a.due_date), parse_due_date(&b.due_date)) {
        (Some(da), Some(db)) => db.cmp(&da),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// The two tables of the transactions tab.
#[derive(Debug)]
pub struct LedgerTables<'a> {
    pub fixed_and_income: Vec<&'a Movement>,
    pub variable_and_leisure: Vec<&'a Movement>,
}

/// Splits into "fixed & income" and "variable & leisure", newest date first.
pub fn ledger_tables(movements: &[Movement]) -> LedgerTables<'_> {
    let (mut fixed_and_income, mut variable_and_leisure): (Vec<&Movement>, Vec<&Movement>) =
        movements.iter().partition(|m| {
            m.kind == MovementKind::Income || m.category == Some(Category::Fixed)
        });

    fixed_and_income.sort_by(|a, b| date_descending(a, b));
    variable_and_leisure.sort_by(|a, b| date_descending(a, b));

    LedgerTables {
        fixed_and_income,
        variable_and_leisure,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Pay,
    Edit,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Paid,
    Income,
}

impl Status {
    pub fn label(&self) -> &'static str {
        match self {
            Status::Pending => "Pendiente",
            Status::Paid => "Pagado",
            Status::Income => "Ingreso",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Status::Pending => "pendiente",
            Status::Paid | Status::Income => "pagado",
        }
    }
}

/// Display-ready row handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementRow {
    pub id: i64,
    pub description: String,
    pub amount: String,
    pub date: String,
    pub days: String,
    pub urgency: Urgency,
    pub urgency_class: &'static str,
    pub status: Status,
    pub status_label: &'static str,
    pub status_class: &'static str,
    pub actions: Vec<Action>,
}

impl MovementRow {
    pub fn build(m: &Movement, today: NaiveDate) -> Self {
        let days = days_remaining(&m.due_date, today);

        let status = match (m.kind, m.paid) {
            (MovementKind::Income, _) => Status::Income,
            (MovementKind::Expense, true) => Status::Paid,
            (MovementKind::Expense, false) => Status::Pending,
        };

        let urgency = if status == Status::Pending {
            Urgency::classify(days)
        } else {
            Urgency::Normal
        };

        let description = match (m.kind, m.category) {
            (MovementKind::Expense, Some(category)) => format!("{} ({})", m.description, category),
            _ => m.description.clone(),
        };

        let date = match (status, m.paid_on.as_deref()) {
            (Status::Paid, Some(paid_on)) => format_date(paid_on),
            _ => format_date(&m.due_date),
        };

        let days_label = match (status, days) {
            (Status::Paid, _) => "Pagado".to_string(),
            (Status::Income, _) => "Ingreso".to_string(),
            (Status::Pending, None) => "Sin fecha".to_string(),
            (Status::Pending, Some(d)) if d < 0 => format!("¡HACE {} DÍAS!", -d),
            (Status::Pending, Some(0)) => "¡HOY!".to_string(),
            (Status::Pending, Some(1)) => "1 día".to_string(),
            (Status::Pending, Some(d)) => format!("{} días", d),
        };

        let actions = if status == Status::Pending {
            vec![Action::Pay, Action::Edit, Action::Delete]
        } else {
            vec![Action::Edit, Action::Delete]
        };

        Self {
            id: m.id,
            description,
            amount: format_amount(m.amount),
            date,
            days: days_label,
            urgency,
            urgency_class: urgency.css_class(),
            status,
            status_label: status.label(),
            status_class: status.css_class(),
            actions,
        }
    }

    pub fn allows(&self, action: Action) -> bool {
        self.actions.contains(&action)
    }

    pub fn can_pay(&self) -> bool {
        self.allows(Action::Pay)
    }

    pub fn can_edit(&self) -> bool {
        self.allows(Action::Edit)
    }

    pub fn can_delete(&self) -> bool {
        self.allows(Action::Delete)
    }
}

/// Summary cards, formatted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryView {
    pub totals: Summary,
    pub policy: TotalSpentPolicy,
    pub pending_total: String,
    pub paid_total: String,
    pub total_spent: String,
    pub income_total: String,
    pub balance: String,
    pub balance_is_positive: bool,
}

impl SummaryView {
    pub fn new(totals: Summary, policy: TotalSpentPolicy) -> Self {
        Self {
            totals,
            policy,
            pending_total: format_amount(totals.pending_total),
            paid_total: format_amount(totals.paid_total),
            total_spent: format_amount(totals.total_spent),
            income_total: format_amount(totals.income_total),
            balance: format_amount(totals.balance),
            balance_is_positive: totals.balance >= 0,
        }
    }
}

/// Every view of the list at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub today: String,
    pub summary: SummaryView,
    pub pending: Vec<MovementRow>,
    pub paid: Vec<MovementRow>,
    pub attention: Vec<MovementRow>,
    pub fixed_and_income: Vec<MovementRow>,
    pub variable_and_leisure: Vec<MovementRow>,
}

impl Dashboard {
    pub fn build(movements: &[Movement], today: NaiveDate, policy: TotalSpentPolicy) -> Self {
        let rows = |list: Vec<&Movement>| -> Vec<MovementRow> {
            list.into_iter().map(|m| MovementRow::build(m, today)).collect()
        };
        let ledger = ledger_tables(movements);

        Self {
            today: format_date(&today.format("%Y-%m-%d").to_string()),
            summary: SummaryView::new(Summary::compute(movements, policy), policy),
            pending: rows(pending(movements, today)),
            paid: rows(paid(movements)),
            attention: rows(attention_order(movements, today)),
            fixed_and_income: rows(ledger.fixed_and_income),
            variable_and_leisure: rows(ledger.variable_and_leisure),
        }
    }
}
