//! Category to ledger expense account mapping

use domain_expense::ExpenseCategory;

/// Name of the ledger expense account a category is booked to
pub fn expense_account(category: ExpenseCategory) -> &'static str {
    match category {
        ExpenseCategory::Travel => "Travel",
        ExpenseCategory::Meals => "Meals and Entertainment",
        ExpenseCategory::OfficeSupplies => "Office Supplies",
        ExpenseCategory::Equipment => "Equipment",
        ExpenseCategory::Other => "Other Business Expenses",
    }
}
