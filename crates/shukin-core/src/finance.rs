use crate::model::{Event, ExpenseItem, Participant};

/// Totals are derived on every read and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Totals {
    pub total_owed: f64,
    /// Sum of every participant's `amount_paid`, whatever their `is_paid`
    /// flag says; partial payments count.
    pub total_paid: f64,
    /// Only expenses marked paid.
    pub total_expenses: f64,
    pub balance: f64,
}

impl Totals {
    pub fn compute(participants: &[Participant], expenses: &[ExpenseItem]) -> Self {
        let total_owed = participants.iter().map(|p| p.amount_owed).sum();
        let total_paid: f64 = participants.iter().map(|p| p.amount_paid).sum();
        let total_expenses: f64 = expenses
            .iter()
            .filter(|e| e.is_paid)
            .map(|e| e.amount)
            .sum();

        Self {
            total_owed,
            total_paid,
            total_expenses,
            balance: total_paid - total_expenses,
        }
    }

    pub fn for_event(event: &Event) -> Self {
        Self::compute(&event.participants, &event.expenses)
    }

    pub fn outstanding(&self) -> f64 {
        (self.total_owed - self.total_paid).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::Totals;
    use crate::model::{ExpenseItem, Participant};

    #[test]
    fn empty_lists_balance_to_zero() {
        let totals = Totals::compute(&[], &[]);
        assert_eq!(totals, Totals::default());
        assert_eq!(totals.balance, 0.0);
    }

    #[test]
    fn unpaid_expenses_are_excluded() {
        let mut venue = ExpenseItem::new("Venue".into(), 12_000.0);
        venue.is_paid = true;
        let drinks = ExpenseItem::new("Drinks".into(), 4_000.0);

        let mut aki = Participant::new("Aki".into(), 5_000.0);
        aki.amount_paid = 5_000.0;
        let mut ren = Participant::new("Ren".into(), 5_000.0);
        ren.amount_paid = 2_000.0;

        let totals = Totals::compute(&[aki, ren], &[venue, drinks]);
        assert_eq!(totals.total_owed, 10_000.0);
        assert_eq!(totals.total_paid, 7_000.0);
        assert_eq!(totals.total_expenses, 12_000.0);
        assert_eq!(totals.balance, -5_000.0);
        assert_eq!(totals.outstanding(), 3_000.0);
    }

    #[test]
    fn partial_payment_counts_even_when_flag_is_set() {
        let mut p = Participant::new("Mio".into(), 5_000.0);
        p.mark_paid(true);
        p.amount_paid = 3_000.0;

        let totals = Totals::compute(std::slice::from_ref(&p), &[]);
        assert!(p.is_paid);
        assert_eq!(totals.total_paid, 3_000.0);
        assert_eq!(totals.balance, totals.total_paid - totals.total_expenses);
    }
}
