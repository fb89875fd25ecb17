use askama::Template;
use movements::models::RawMovementForm;
use movements::views::Dashboard;
use serde::Deserialize;

/// One-shot message shown after a redirect (`/?aviso=...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Notice {
    #[serde(rename = "creado")]
    Created,
    #[serde(rename = "actualizado")]
    Updated,
    #[serde(rename = "pagado")]
    Paid,
    #[serde(rename = "eliminado")]
    Deleted,
    #[serde(rename = "cancelado")]
    Cancelled,
    #[serde(rename = "almacenamiento")]
    StorageWarning,
}

impl Notice {
    pub fn param(&self) -> &'static str {
        match self {
            Notice::Created => "creado",
            Notice::Updated => "actualizado",
            Notice::Paid => "pagado",
            Notice::Deleted => "eliminado",
            Notice::Cancelled => "cancelado",
            Notice::StorageWarning => "almacenamiento",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Notice::Created => "Movimiento añadido.",
            Notice::Updated => "Movimiento actualizado.",
            Notice::Paid => "Gasto marcado como pagado.",
            Notice::Deleted => "Movimiento eliminado.",
            Notice::Cancelled => "Eliminación cancelada.",
            Notice::StorageWarning => "No se pudo guardar: los cambios solo duran esta sesión.",
        }
    }

    pub fn css_class(&self) -> &'static str {
        match self {
            Notice::Deleted | Notice::StorageWarning => "error",
            _ => "success",
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub dashboard: Dashboard,
    pub notice: Option<Notice>,
}

#[derive(Template)]
#[template(path = "movement_form.html")]
pub struct MovementFormTemplate {
    pub title: &'static str,
    pub action: String,
    pub form: RawMovementForm,
    pub error: Option<String>,
}

impl MovementFormTemplate {
    pub fn create(form: RawMovementForm, error: Option<String>) -> Self {
        Self {
            title: "Añadir Movimiento",
            action: "/movimientos".to_string(),
            form,
            error,
        }
    }

    pub fn edit(id: i64, form: RawMovementForm, error: Option<String>) -> Self {
        Self {
            title: "Editar Movimiento",
            action: format!("/movimientos/{}", id),
            form,
            error,
        }
    }
}

#[derive(Template)]
#[template(path = "confirm_delete.html")]
pub struct ConfirmDeleteTemplate {
    pub id: i64,
    pub description: String,
    pub amount: String,
}
