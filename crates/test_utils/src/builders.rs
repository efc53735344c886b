//! Test Data Builders
//!
//! Builders for expenses and users that let tests state only the fields
//! they care about. Expenses are produced through the domain's own
//! lifecycle methods, so a built record always satisfies the same
//! invariants as one created by the service.

use chrono::{NaiveDate, Utc};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;

use core_kernel::{Amount, UserId};
use domain_expense::{
    Expense, ExpenseCategory, ExternalSignals, NewExpense, PolicyEvaluator, ReceiptRef, Role, User,
};

use crate::fixtures::{AmountFixtures, DateFixtures};

#[derive(Debug, Clone)]
enum Review {
    None,
    Approved { by: UserId, notes: Option<String> },
    Rejected { by: UserId, reason: String },
}

/// Builder for expenses in any lifecycle state
#[derive(Debug, Clone)]
pub struct ExpenseBuilder {
    claimant_id: UserId,
    description: String,
    amount: Amount,
    category: ExpenseCategory,
    expense_date: NaiveDate,
    notes: Option<String>,
    receipt: Option<ReceiptRef>,
    signals: ExternalSignals,
    review: Review,
    batch: Option<String>,
    ledger_record: Option<String>,
}

impl ExpenseBuilder {
    /// A pending Meals expense for `claimant_id`
    pub fn new(claimant_id: UserId) -> Self {
        Self {
            claimant_id,
            description: "Team lunch".to_string(),
            amount: AmountFixtures::lunch(),
            category: ExpenseCategory::Meals,
            expense_date: DateFixtures::expense_date(),
            notes: None,
            receipt: None,
            signals: ExternalSignals::default(),
            review: Review::None,
            batch: None,
            ledger_record: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn amount(mut self, amount: Amount) -> Self {
        self.amount = amount;
        self
    }

    pub fn category(mut self, category: ExpenseCategory) -> Self {
        self.category = category;
        self
    }

    pub fn expense_date(mut self, date: NaiveDate) -> Self {
        self.expense_date = date;
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Attaches a PDF receipt named `file_name`
    pub fn receipt(mut self, file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        self.receipt = Some(ReceiptRef {
            storage_key: format!("receipts/{}", uuid::Uuid::new_v4()),
            file_name,
            content_type: "application/pdf".to_string(),
        });
        self
    }

    pub fn signals(mut self, signals: ExternalSignals) -> Self {
        self.signals = signals;
        self
    }

    pub fn approved_by(mut self, approver: UserId) -> Self {
        self.review = Review::Approved { by: approver, notes: None };
        self
    }

    pub fn approved_with_notes(mut self, approver: UserId, notes: impl Into<String>) -> Self {
        self.review = Review::Approved {
            by: approver,
            notes: Some(notes.into()),
        };
        self
    }

    pub fn rejected_by(mut self, approver: UserId, reason: impl Into<String>) -> Self {
        self.review = Review::Rejected {
            by: approver,
            reason: reason.into(),
        };
        self
    }

    /// Stamps an export batch key; only meaningful on approved expenses
    pub fn staged(mut self, batch: impl Into<String>) -> Self {
        self.batch = Some(batch.into());
        self
    }

    /// Marks the expense as written to the ledger under `record_id`
    pub fn exported(mut self, record_id: impl Into<String>) -> Self {
        self.ledger_record = Some(record_id.into());
        self
    }

    /// Builds the expense
    ///
    /// # Panics
    ///
    /// Panics when the requested state cannot be reached, e.g. exporting a
    /// rejected expense.
    pub fn build(self) -> Expense {
        let mut expense = Expense::submit(
            NewExpense {
                claimant_id: self.claimant_id,
                description: self.description,
                amount: self.amount,
                category: self.category,
                expense_date: self.expense_date,
                notes: self.notes,
                receipt: self.receipt,
                signals: self.signals,
            },
            &PolicyEvaluator::default(),
        )
        .expect("builder produces a valid submission");

        match self.review {
            Review::None => {}
            Review::Approved { by, notes } => expense
                .approve(by, notes.as_deref(), Utc::now())
                .expect("pending expense can be approved"),
            Review::Rejected { by, reason } => expense
                .reject(by, &reason, Utc::now())
                .expect("pending expense can be rejected"),
        }

        if let Some(batch) = self.batch {
            expense.stage_for_export(&batch).expect("approved expense can be staged");
        }
        if let Some(record) = self.ledger_record {
            expense.mark_exported(&record).expect("approved expense can be exported");
        }

        expense
    }
}

/// Builder for users with generated names and emails
#[derive(Debug, Clone)]
pub struct UserBuilder {
    name: String,
    email: String,
    role: Role,
    manager_id: Option<UserId>,
    department: Option<String>,
}

impl UserBuilder {
    /// An employee with a random name and email
    pub fn new() -> Self {
        Self {
            name: Name().fake(),
            email: SafeEmail().fake(),
            role: Role::Employee,
            manager_id: None,
            department: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn reporting_to(mut self, manager_id: UserId) -> Self {
        self.manager_id = Some(manager_id);
        self
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn build(self) -> User {
        let mut user = User::new(self.name, self.email, self.role);
        user.manager_id = self.manager_id;
        user.department = self.department;
        user
    }
}

impl Default for UserBuilder {
    fn default() -> Self {
        Self::new()
    }
}
