//! In-memory transactional store for all ledger rows.
//!
//! One `LedgerState` behind a `RwLock` plays the role any transactional
//! relational store would; journal entries, lines, fund transactions,
//! payments, and dividends are append-only, everything else is mutated only
//! by the posting engine while holding the owning entity's lock.

use std::collections::HashMap;

use rust_decimal::Decimal;

use coopledger_chart::{Account, AccountGroup, Side};
use coopledger_core::{
    AccountGroupId, AccountId, FundId, InvoiceLineId, JournalEntryId, LedgerError, LedgerResult,
    LoanId, ScheduleLineId,
};
use coopledger_dividends::Dividend;
use coopledger_funds::{FundAccount, FundTransaction};
use coopledger_invoicing::{InvoiceLine, LinePayment};
use coopledger_journal::{JournalEntry, JournalLine};
use coopledger_loans::{Loan, ScheduleLine};

#[derive(Debug, Default)]
pub struct LedgerState {
    pub groups: HashMap<AccountGroupId, AccountGroup>,
    pub accounts: HashMap<AccountId, Account>,
    pub entries: HashMap<JournalEntryId, JournalEntry>,
    /// All committed lines, in commit order.
    pub lines: Vec<JournalLine>,
    pub loans: HashMap<LoanId, Loan>,
    pub schedules: HashMap<LoanId, Vec<ScheduleLine>>,
    pub funds: HashMap<FundId, FundAccount>,
    pub fund_transactions: Vec<FundTransaction>,
    pub invoice_lines: HashMap<InvoiceLineId, InvoiceLine>,
    pub payments: Vec<LinePayment>,
    pub dividends: Vec<Dividend>,
}

impl LedgerState {
    pub fn account(&self, id: AccountId) -> LedgerResult<&Account> {
        self.accounts.get(&id).ok_or(LedgerError::UnknownAccount(id))
    }

    pub fn account_mut(&mut self, id: AccountId) -> LedgerResult<&mut Account> {
        self.accounts
            .get_mut(&id)
            .ok_or(LedgerError::UnknownAccount(id))
    }

    pub fn entry(&self, id: JournalEntryId) -> LedgerResult<&JournalEntry> {
        self.entries.get(&id).ok_or(LedgerError::NotFound)
    }

    pub fn lines_for_entry(&self, id: JournalEntryId) -> Vec<JournalLine> {
        self.lines
            .iter()
            .filter(|line| line.entry_id == id)
            .cloned()
            .collect()
    }

    pub fn loan(&self, id: LoanId) -> LedgerResult<&Loan> {
        self.loans.get(&id).ok_or(LedgerError::NotFound)
    }

    pub fn loan_mut(&mut self, id: LoanId) -> LedgerResult<&mut Loan> {
        self.loans.get_mut(&id).ok_or(LedgerError::NotFound)
    }

    pub fn schedule_line(
        &self,
        loan_id: LoanId,
        line_id: ScheduleLineId,
    ) -> LedgerResult<&ScheduleLine> {
        self.schedules
            .get(&loan_id)
            .and_then(|lines| lines.iter().find(|l| l.id == line_id))
            .ok_or(LedgerError::NotFound)
    }

    pub fn schedule_line_mut(
        &mut self,
        loan_id: LoanId,
        line_id: ScheduleLineId,
    ) -> LedgerResult<&mut ScheduleLine> {
        self.schedules
            .get_mut(&loan_id)
            .and_then(|lines| lines.iter_mut().find(|l| l.id == line_id))
            .ok_or(LedgerError::NotFound)
    }

    pub fn fund(&self, id: FundId) -> LedgerResult<&FundAccount> {
        self.funds.get(&id).ok_or(LedgerError::NotFound)
    }

    pub fn fund_mut(&mut self, id: FundId) -> LedgerResult<&mut FundAccount> {
        self.funds.get_mut(&id).ok_or(LedgerError::NotFound)
    }

    pub fn invoice_line(&self, id: InvoiceLineId) -> LedgerResult<&InvoiceLine> {
        self.invoice_lines.get(&id).ok_or(LedgerError::NotFound)
    }

    pub fn invoice_line_mut(&mut self, id: InvoiceLineId) -> LedgerResult<&mut InvoiceLine> {
        self.invoice_lines.get_mut(&id).ok_or(LedgerError::NotFound)
    }

    /// Audit check: replay the full line history for one account.
    ///
    /// The result must always equal the stored running balance; a divergence
    /// means the engine broke its atomicity contract.
    pub fn recompute_running_balance(&self, id: AccountId) -> LedgerResult<Decimal> {
        let account = self.account(id)?;
        let normal = account.normal_side();
        let mut balance = account.opening_balance;
        for line in self.lines.iter().filter(|l| l.account_id == id) {
            balance += signed_line_amount(line, normal);
        }
        Ok(balance)
    }
}

/// Signed effect of a committed line on an account with the given normal side.
pub fn signed_line_amount(line: &JournalLine, normal: Side) -> Decimal {
    if line.side() == normal {
        line.amount()
    } else {
        -line.amount()
    }
}
