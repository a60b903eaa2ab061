//! The posting engine: every mutating ledger operation lives here.
//!
//! Each operation follows the same pipeline:
//!
//! 1. claim the per-entity locks it needs (all-or-nothing, `Busy` on timeout)
//! 2. decide against a read snapshot (pure domain logic; any failure returns
//!    here, before a single write)
//! 3. apply every row change under one write guard (journal entry + lines,
//!    account running balances, domain aggregate), then release the locks
//!
//! Step 3 never fails on domain grounds, so no partial commit is observable.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use coopledger_chart::{Account, AccountGroup, AccountType};
use coopledger_core::{
    AccountGroupId, AccountId, Amount, DividendId, FundId, FundTransactionId, InvoiceLineId,
    JournalEntryId, LedgerError, LedgerResult, LoanId, MemberId, PaymentId, ScheduleLineId,
};
use coopledger_dividends::Dividend;
use coopledger_funds::{FundAccount, FundDirection, FundKind, FundTransaction};
use coopledger_invoicing::{InvoiceLine, LinePayment};
use coopledger_journal::{reversal_draft, DraftLeg, EntryDraft, JournalEntry, JournalLine, Reference};
use coopledger_loans::{generate_schedule, Loan, LoanTerms, ScheduleLine};

use crate::config::EngineConfig;
use crate::lock::{LockKey, LockTable};
use crate::state::LedgerState;

/// Single writer for all ledger state.
///
/// Callers translate domain events into the operations below; the engine
/// alone mutates account running balances and loan/fund/invoice aggregates.
#[derive(Debug)]
pub struct PostingEngine {
    config: EngineConfig,
    state: RwLock<LedgerState>,
    locks: LockTable,
}

impl PostingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: RwLock::new(LedgerState::default()),
            locks: LockTable::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn read_state(&self) -> LedgerResult<RwLockReadGuard<'_, LedgerState>> {
        self.state
            .read()
            .map_err(|_| LedgerError::validation("ledger state lock poisoned"))
    }

    fn write_state(&self) -> LedgerResult<RwLockWriteGuard<'_, LedgerState>> {
        self.state
            .write()
            .map_err(|_| LedgerError::validation("ledger state lock poisoned"))
    }

    /// Lock keys for an entry draft: every referenced account, ascending.
    fn entry_lock_keys(draft: &EntryDraft) -> Vec<LockKey> {
        draft
            .legs
            .iter()
            .map(|leg| LockKey::Account(leg.account_id))
            .collect()
    }

    /// Domain checks the engine owns: every leg account exists and is active.
    fn check_draft_accounts(state: &LedgerState, draft: &EntryDraft) -> LedgerResult<()> {
        for leg in &draft.legs {
            state.account(leg.account_id)?.ensure_postable()?;
        }
        Ok(())
    }

    /// Write a validated draft: insert the entry and its lines, apply each
    /// leg's signed delta to the account running balances. Callers hold the
    /// locks for every referenced account.
    fn commit_entry(
        state: &mut LedgerState,
        draft: EntryDraft,
        reverses: Option<JournalEntryId>,
    ) -> LedgerResult<(JournalEntry, Vec<JournalLine>)> {
        let entry_id = JournalEntryId::new();
        let mut lines = Vec::with_capacity(draft.legs.len());
        for leg in &draft.legs {
            state.account_mut(leg.account_id)?.apply_leg(leg.side, leg.amount);
            lines.push(JournalLine::from_leg(entry_id, leg));
        }

        let entry = JournalEntry {
            id: entry_id,
            date: draft.date,
            reference: draft.reference,
            memo: draft.memo,
            reverses,
            posted_at: Utc::now(),
        };
        info!(
            entry_id = %entry.id,
            reference = ?entry.reference,
            legs = lines.len(),
            "journal entry posted"
        );
        state.entries.insert(entry.id, entry.clone());
        state.lines.extend(lines.iter().cloned());
        Ok((entry, lines))
    }

    // ---- Chart of accounts -------------------------------------------------

    /// Ids are passed explicitly so callers can wire well-known accounts
    /// into [`EngineConfig`] before the chart is seeded.
    pub fn create_group(
        &self,
        id: AccountGroupId,
        account_type: AccountType,
        name: impl Into<String>,
    ) -> LedgerResult<AccountGroup> {
        let group = AccountGroup {
            id,
            account_type,
            name: name.into(),
        };
        let mut state = self.write_state()?;
        if state.groups.contains_key(&id) {
            return Err(LedgerError::validation("account group already exists"));
        }
        state.groups.insert(id, group.clone());
        Ok(group)
    }

    pub fn create_account(
        &self,
        id: AccountId,
        group_id: AccountGroupId,
        name: impl Into<String>,
        opening_balance: Decimal,
    ) -> LedgerResult<Account> {
        let mut state = self.write_state()?;
        if state.accounts.contains_key(&id) {
            return Err(LedgerError::validation("account already exists"));
        }
        let group = state.groups.get(&group_id).ok_or(LedgerError::NotFound)?;
        let account = Account::new(id, group, name, opening_balance);
        state.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    /// Accounts are deactivated, never deleted.
    pub fn deactivate_account(&self, id: AccountId) -> LedgerResult<Account> {
        let _guard = self
            .locks
            .acquire(vec![LockKey::Account(id)], self.config.lock_timeout)?;
        let mut state = self.write_state()?;
        let account = state.account_mut(id)?;
        account.active = false;
        Ok(account.clone())
    }

    /// Fails `UnknownAccount` / `InactiveAccount`.
    pub fn resolve(&self, id: AccountId) -> LedgerResult<Account> {
        let state = self.read_state()?;
        let account = state.account(id)?;
        account.ensure_postable()?;
        Ok(account.clone())
    }

    /// The committed running balance; no caching layer that can go stale.
    pub fn balance(&self, id: AccountId) -> LedgerResult<Decimal> {
        Ok(self.read_state()?.account(id)?.running_balance)
    }

    /// Recompute one account's balance from the full line history.
    pub fn audit_balance(&self, id: AccountId) -> LedgerResult<Decimal> {
        self.read_state()?.recompute_running_balance(id)
    }

    // ---- Journal engine ----------------------------------------------------

    /// Post a balanced entry draft.
    pub fn post(&self, draft: EntryDraft) -> LedgerResult<(JournalEntry, Vec<JournalLine>)> {
        self.post_with_reversal(draft, None)
    }

    /// Post a new entry with every leg of `entry_id` swapped, linked to the
    /// original. The original is never mutated.
    pub fn reverse(
        &self,
        entry_id: JournalEntryId,
        date: NaiveDate,
    ) -> LedgerResult<(JournalEntry, Vec<JournalLine>)> {
        let draft = {
            let state = self.read_state()?;
            let entry = state.entry(entry_id)?;
            // Committed entries and lines are immutable, safe to read unlocked.
            reversal_draft(entry, &state.lines_for_entry(entry_id), date)
        };
        self.post_with_reversal(draft, Some(entry_id))
    }

    fn post_with_reversal(
        &self,
        draft: EntryDraft,
        reverses: Option<JournalEntryId>,
    ) -> LedgerResult<(JournalEntry, Vec<JournalLine>)> {
        draft.validate()?;
        let _guard = self
            .locks
            .acquire(Self::entry_lock_keys(&draft), self.config.lock_timeout)?;

        {
            let state = self.read_state()?;
            Self::check_draft_accounts(&state, &draft)?;
        }

        let mut state = self.write_state()?;
        Self::commit_entry(&mut state, draft, reverses)
    }

    // ---- Loan ledger -------------------------------------------------------

    /// Issue a loan: create the row, generate the amortization schedule, and
    /// post the disbursement entry, atomically.
    pub fn disburse(
        &self,
        borrower: MemberId,
        source_fund: FundId,
        terms: &LoanTerms,
    ) -> LedgerResult<(Loan, Vec<ScheduleLine>)> {
        let mut loan = Loan::issue(LoanId::new(), borrower, source_fund, terms, None)?;
        let schedule = generate_schedule(loan.id, terms)?;
        let draft = self.disbursement_draft(&loan, terms.start_date);

        let _guard = self
            .locks
            .acquire(Self::entry_lock_keys(&draft), self.config.lock_timeout)?;

        {
            let state = self.read_state()?;
            state.fund(source_fund)?;
            Self::check_draft_accounts(&state, &draft)?;
        }

        let mut state = self.write_state()?;
        let (entry, _lines) = Self::commit_entry(&mut state, draft, None)?;
        loan.journal_entry = Some(entry.id);
        debug!(loan_id = %loan.id, entry_id = %entry.id, "loan disbursed");
        state.loans.insert(loan.id, loan.clone());
        state.schedules.insert(loan.id, schedule.clone());
        Ok((loan, schedule))
    }

    /// Disbursement posts on the schedule start date: debit loans
    /// receivable, credit the cash account that financed it.
    fn disbursement_draft(&self, loan: &Loan, date: NaiveDate) -> EntryDraft {
        let accounts = &self.config.accounts;
        EntryDraft::new(
            date,
            Reference::LoanDisbursement(loan.id),
            vec![
                DraftLeg::debit(accounts.loans_receivable, loan.principal),
                DraftLeg::credit(accounts.cash, loan.principal),
            ],
        )
    }

    /// Record one repayment against a schedule line.
    ///
    /// Posts cash against loans-receivable (principal) and interest income
    /// (interest), marks the line paid, and closes the loan in the same
    /// commit when outstanding principal reaches exactly zero.
    pub fn repay(
        &self,
        loan_id: LoanId,
        line_id: ScheduleLineId,
        principal_paid: Amount,
        interest_paid: Amount,
        payment_date: NaiveDate,
    ) -> LedgerResult<(Loan, ScheduleLine)> {
        let accounts = self.config.accounts;
        let total = principal_paid
            .checked_add(interest_paid)
            .ok_or_else(|| LedgerError::validation("repayment amount overflow"))?;

        let mut keys = vec![
            LockKey::Loan(loan_id),
            LockKey::Account(accounts.cash),
            LockKey::Account(accounts.loans_receivable),
            LockKey::Account(accounts.interest_income),
        ];
        keys.sort_unstable();
        let _guard = self.locks.acquire(keys, self.config.lock_timeout)?;

        let (decision, draft) = {
            let state = self.read_state()?;
            let loan = state.loan(loan_id)?;
            let line = state.schedule_line(loan_id, line_id)?;
            let decision = loan.decide_repayment(line, principal_paid, interest_paid)?;

            let mut legs = vec![DraftLeg::debit(accounts.cash, total)];
            if !principal_paid.is_zero() {
                legs.push(DraftLeg::credit(accounts.loans_receivable, principal_paid));
            }
            if !interest_paid.is_zero() {
                legs.push(DraftLeg::credit(accounts.interest_income, interest_paid));
            }
            let draft = EntryDraft::new(payment_date, Reference::LoanRepayment(line_id), legs);
            draft.validate()?;
            Self::check_draft_accounts(&state, &draft)?;
            (decision, draft)
        };

        let mut state = self.write_state()?;
        let (entry, _lines) = Self::commit_entry(&mut state, draft, None)?;
        {
            let line = state.schedule_line_mut(loan_id, line_id)?;
            line.record_payment(principal_paid, interest_paid, payment_date, entry.id);
        }
        let loan = state.loan_mut(loan_id)?;
        loan.apply_repayment(decision);
        debug!(
            loan_id = %loan_id,
            outstanding = %loan.outstanding_principal,
            closed = decision.closes_loan,
            "repayment posted"
        );
        let loan = loan.clone();
        let line = state.schedule_line(loan_id, line_id)?.clone();
        Ok((loan, line))
    }

    /// Close out an active loan into a child loan carrying new terms.
    ///
    /// The source ends in the terminal `Renewed` state; the child references
    /// it via `parent_loan` and is disbursed in the same commit.
    pub fn renew(
        &self,
        loan_id: LoanId,
        terms: &LoanTerms,
    ) -> LedgerResult<(Loan, Vec<ScheduleLine>)> {
        let accounts = self.config.accounts;
        let mut keys = vec![
            LockKey::Loan(loan_id),
            LockKey::Account(accounts.cash),
            LockKey::Account(accounts.loans_receivable),
        ];
        keys.sort_unstable();
        let _guard = self.locks.acquire(keys, self.config.lock_timeout)?;

        let (mut child, schedule, draft) = {
            let state = self.read_state()?;
            let source = state.loan(loan_id)?;
            source.ensure_renewable()?;
            let child = Loan::issue(
                LoanId::new(),
                source.borrower,
                source.source_fund,
                terms,
                Some(loan_id),
            )?;
            let schedule = generate_schedule(child.id, terms)?;
            let draft = self.disbursement_draft(&child, terms.start_date);
            draft.validate()?;
            Self::check_draft_accounts(&state, &draft)?;
            (child, schedule, draft)
        };

        let mut state = self.write_state()?;
        let (entry, _lines) = Self::commit_entry(&mut state, draft, None)?;
        child.journal_entry = Some(entry.id);
        state.loan_mut(loan_id)?.mark_renewed();
        state.loans.insert(child.id, child.clone());
        state.schedules.insert(child.id, schedule.clone());
        info!(source = %loan_id, child = %child.id, "loan renewed");
        Ok((child, schedule))
    }

    // ---- Fund ledger -------------------------------------------------------

    pub fn open_fund(&self, member: MemberId) -> LedgerResult<FundAccount> {
        let fund = FundAccount::open(FundId::new(), member, Utc::now());
        let mut state = self.write_state()?;
        state.funds.insert(fund.id, fund.clone());
        Ok(fund)
    }

    pub fn fund(&self, id: FundId) -> LedgerResult<FundAccount> {
        Ok(self.read_state()?.fund(id)?.clone())
    }

    /// Apply a deposit/withdrawal; the posted balance is captured inside the
    /// fund's critical section.
    pub fn fund_apply(
        &self,
        fund_id: FundId,
        kind: FundKind,
        direction: FundDirection,
        amount: Amount,
    ) -> LedgerResult<FundTransaction> {
        self.fund_apply_inner(fund_id, kind, direction, amount, None)
    }

    /// Apply a deposit/withdrawal with a caller-captured posted balance.
    ///
    /// If another update intervened since the caller read the balance, fails
    /// `StaleBalance`; retry with a fresh read.
    pub fn fund_apply_expected(
        &self,
        fund_id: FundId,
        kind: FundKind,
        direction: FundDirection,
        amount: Amount,
        expected_posted: Decimal,
    ) -> LedgerResult<FundTransaction> {
        self.fund_apply_inner(fund_id, kind, direction, amount, Some(expected_posted))
    }

    fn fund_apply_inner(
        &self,
        fund_id: FundId,
        kind: FundKind,
        direction: FundDirection,
        amount: Amount,
        expected_posted: Option<Decimal>,
    ) -> LedgerResult<FundTransaction> {
        let accounts = self.config.accounts;
        let liability = match kind {
            FundKind::Savings => accounts.savings_liability,
            FundKind::ShareCapital => accounts.share_capital_liability,
        };

        let mut keys = vec![
            LockKey::Fund(fund_id),
            LockKey::Account(accounts.cash),
            LockKey::Account(liability),
        ];
        keys.sort_unstable();
        let _guard = self.locks.acquire(keys, self.config.lock_timeout)?;

        let tx_id = FundTransactionId::new();
        let (decision, draft) = {
            let state = self.read_state()?;
            let fund = state.fund(fund_id)?;
            let decision = fund.decide(kind, direction, amount, expected_posted)?;

            let legs = match direction {
                FundDirection::Deposit => vec![
                    DraftLeg::debit(accounts.cash, amount),
                    DraftLeg::credit(liability, amount),
                ],
                FundDirection::Withdrawal => vec![
                    DraftLeg::debit(liability, amount),
                    DraftLeg::credit(accounts.cash, amount),
                ],
            };
            let draft = EntryDraft::new(
                Utc::now().date_naive(),
                Reference::FundTransaction(tx_id),
                legs,
            );
            draft.validate()?;
            Self::check_draft_accounts(&state, &draft)?;
            (decision, draft)
        };

        let now = Utc::now();
        let mut state = self.write_state()?;
        let (entry, _lines) = Self::commit_entry(&mut state, draft, None)?;
        state.fund_mut(fund_id)?.apply(&decision, now);
        let mut tx = FundTransaction::from_decision(tx_id, fund_id, &decision, now);
        tx.journal_entry = Some(entry.id);
        state.fund_transactions.push(tx.clone());
        debug!(
            fund_id = %fund_id,
            kind = ?kind,
            direction = ?direction,
            new_balance = %decision.new_balance,
            "fund transaction applied"
        );
        Ok(tx)
    }

    // ---- Invoice settlement ------------------------------------------------

    pub fn create_invoice_line(
        &self,
        member: MemberId,
        description: impl Into<String>,
        principal_price: Amount,
        trade_markup: Amount,
        quantity: u32,
    ) -> LedgerResult<InvoiceLine> {
        let line = InvoiceLine::new(
            InvoiceLineId::new(),
            member,
            description,
            principal_price,
            trade_markup,
            quantity,
        )?;
        let mut state = self.write_state()?;
        state.invoice_lines.insert(line.id, line.clone());
        Ok(line)
    }

    /// Allocate a payment received against an open invoice line.
    ///
    /// Flips `is_totally_paid` in the same commit when cumulative principal
    /// paid reaches the line's total owed.
    pub fn allocate(
        &self,
        line_id: InvoiceLineId,
        principal_paid: Amount,
        interest_paid: Amount,
        date: NaiveDate,
    ) -> LedgerResult<(InvoiceLine, LinePayment)> {
        let accounts = self.config.accounts;
        let total = principal_paid
            .checked_add(interest_paid)
            .ok_or_else(|| LedgerError::validation("payment amount overflow"))?;

        let mut keys = vec![
            LockKey::InvoiceLine(line_id),
            LockKey::Account(accounts.cash),
            LockKey::Account(accounts.trade_receivable),
            LockKey::Account(accounts.markup_income),
        ];
        keys.sort_unstable();
        let _guard = self.locks.acquire(keys, self.config.lock_timeout)?;

        let payment_id = PaymentId::new();
        let (decision, draft) = {
            let state = self.read_state()?;
            let line = state.invoice_line(line_id)?;
            let decision = line.decide_allocation(principal_paid, interest_paid)?;

            let mut legs = vec![DraftLeg::debit(accounts.cash, total)];
            if !principal_paid.is_zero() {
                legs.push(DraftLeg::credit(accounts.trade_receivable, principal_paid));
            }
            if !interest_paid.is_zero() {
                legs.push(DraftLeg::credit(accounts.markup_income, interest_paid));
            }
            let draft = EntryDraft::new(date, Reference::InvoicePayment(payment_id), legs);
            draft.validate()?;
            Self::check_draft_accounts(&state, &draft)?;
            (decision, draft)
        };

        let mut state = self.write_state()?;
        let (entry, _lines) = Self::commit_entry(&mut state, draft, None)?;
        let line = state.invoice_line_mut(line_id)?;
        line.apply_allocation(&decision);
        let line = line.clone();
        let payment = LinePayment {
            id: payment_id,
            invoice_line_id: line_id,
            principal_paid,
            interest_paid,
            journal_entry: Some(entry.id),
            paid_at: Utc::now(),
        };
        state.payments.push(payment.clone());
        debug!(
            line_id = %line_id,
            fully_paid = decision.fully_paid,
            "invoice payment allocated"
        );
        Ok((line, payment))
    }

    // ---- Dividend poster ---------------------------------------------------

    /// Post one balanced equity credit and record the dividend row.
    ///
    /// Declaring twice for the same member/account/date is a caller error;
    /// use [`PostingEngine::find_dividend`] first.
    pub fn declare_dividend(
        &self,
        member: MemberId,
        account_id: AccountId,
        amount: Amount,
        date: NaiveDate,
    ) -> LedgerResult<Dividend> {
        let accounts = self.config.accounts;
        let mut dividend = Dividend::declare(DividendId::new(), member, account_id, amount, date)?;
        let draft = EntryDraft::new(
            date,
            Reference::Dividend(dividend.id),
            vec![
                DraftLeg::debit(accounts.retained_earnings, amount),
                DraftLeg::credit(account_id, amount),
            ],
        );
        draft.validate()?;

        let _guard = self
            .locks
            .acquire(Self::entry_lock_keys(&draft), self.config.lock_timeout)?;

        {
            let state = self.read_state()?;
            Self::check_draft_accounts(&state, &draft)?;
        }

        let mut state = self.write_state()?;
        let (entry, _lines) = Self::commit_entry(&mut state, draft, None)?;
        dividend.journal_entry = Some(entry.id);
        state.dividends.push(dividend.clone());
        Ok(dividend)
    }

    /// Lookup for callers checking against duplicate declarations.
    pub fn find_dividend(
        &self,
        member: MemberId,
        account_id: AccountId,
        date: NaiveDate,
    ) -> LedgerResult<Option<Dividend>> {
        let state = self.read_state()?;
        Ok(state
            .dividends
            .iter()
            .find(|d| d.matches(member, account_id, date))
            .cloned())
    }

    // ---- Read access for rendering/receipts --------------------------------

    /// All committed entries, for rendering and audit.
    pub fn entries(&self) -> LedgerResult<Vec<JournalEntry>> {
        Ok(self.read_state()?.entries.values().cloned().collect())
    }

    /// A fund's applied transactions, in commit order.
    pub fn fund_transactions(&self, fund_id: FundId) -> LedgerResult<Vec<FundTransaction>> {
        let state = self.read_state()?;
        state.fund(fund_id)?;
        Ok(state
            .fund_transactions
            .iter()
            .filter(|tx| tx.fund_id == fund_id)
            .cloned()
            .collect())
    }

    pub fn entry(&self, id: JournalEntryId) -> LedgerResult<(JournalEntry, Vec<JournalLine>)> {
        let state = self.read_state()?;
        let entry = state.entry(id)?.clone();
        let lines = state.lines_for_entry(id);
        Ok((entry, lines))
    }

    pub fn loan(&self, id: LoanId) -> LedgerResult<Loan> {
        Ok(self.read_state()?.loan(id)?.clone())
    }

    pub fn schedule(&self, loan_id: LoanId) -> LedgerResult<Vec<ScheduleLine>> {
        let state = self.read_state()?;
        state.loan(loan_id)?;
        Ok(state.schedules.get(&loan_id).cloned().unwrap_or_default())
    }

    pub fn invoice_line(&self, id: InvoiceLineId) -> LedgerResult<InvoiceLine> {
        Ok(self.read_state()?.invoice_line(id)?.clone())
    }
}
