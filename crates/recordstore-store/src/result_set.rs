//! Lazily iterating result sets.
//!
//! A [`ResultSet`] owns the cursor of one executed query. Rows are pulled on
//! demand: one at a time when the query has no batched relationships, or a
//! page of up to `batch_size` parents when it does, so each page costs exactly
//! one extra query per one-to-many relationship.
//!
//! ```ignore
//! let mut people = store.find(Query::new().with_relation("pets", None))?;
//! while people.advance()? {
//!     let person = people.current()?;
//!     println!("{} has {} pets", person.name, person.pets.len());
//! }
//! ```

use std::collections::VecDeque;

use recordstore_core::{Error, Model, Result, Value};
use recordstore_query::{Connection, Cursor, SelectPlan};

use crate::loader::{decode_columns, decode_joined, load_batch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Exhausted,
    Closed,
}

/// Lazy cursor over the records of one query.
///
/// Not thread-safe. Once exhausted or closed, every read fails with
/// [`Error::Closed`].
pub struct ResultSet<'c, M: Model, C: Connection + 'c> {
    conn: &'c C,
    cursor: Option<C::Cursor<'c>>,
    plan: SelectPlan,
    page_size: usize,
    log_statements: bool,
    page: VecDeque<M>,
    current: Option<M>,
    state: State,
}

impl<'c, M: Model, C: Connection + 'c> ResultSet<'c, M, C> {
    pub(crate) fn new(
        conn: &'c C,
        cursor: C::Cursor<'c>,
        plan: SelectPlan,
        batch_size: usize,
        log_statements: bool,
    ) -> Self {
        let page_size = if plan.batched.is_empty() {
            1
        } else {
            batch_size.max(1)
        };
        Self {
            conn,
            cursor: Some(cursor),
            plan,
            page_size,
            log_statements,
            page: VecDeque::new(),
            current: None,
            state: State::Open,
        }
    }

    /// Move to the next record. Returns `false` once the rows are exhausted;
    /// the cursor is released at that point.
    pub fn advance(&mut self) -> Result<bool> {
        if self.state != State::Open {
            return Err(Error::Closed);
        }
        if self.page.is_empty() {
            if let Err(e) = self.fill_page() {
                self.close();
                return Err(e);
            }
        }
        match self.page.pop_front() {
            Some(record) => {
                self.current = Some(record);
                Ok(true)
            }
            None => {
                self.release();
                self.current = None;
                self.state = State::Exhausted;
                Ok(false)
            }
        }
    }

    /// Take the record at the current position.
    ///
    /// Each position yields its record once; call [`ResultSet::advance`]
    /// before the next `current`.
    pub fn current(&mut self) -> Result<M> {
        if self.state != State::Open {
            return Err(Error::Closed);
        }
        self.current.take().ok_or_else(|| {
            Error::Precondition("no current record; call advance() first".to_string())
        })
    }

    /// Release the cursor. Safe to call repeatedly and after exhaustion.
    pub fn close(&mut self) {
        self.release();
        self.page.clear();
        self.current = None;
        self.state = State::Closed;
    }

    /// Whether the result set has been exhausted or closed.
    pub fn is_closed(&self) -> bool {
        self.state != State::Open
    }

    /// The compiled plan this result set executes.
    pub fn plan(&self) -> &SelectPlan {
        &self.plan
    }

    fn release(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
    }

    fn fill_page(&mut self) -> Result<()> {
        let Some(mut cursor) = self.cursor.take() else {
            return Ok(());
        };
        let mut parents = Vec::with_capacity(self.page_size);
        let mut exhausted = false;
        while parents.len() < self.page_size {
            let decoded = match cursor.next_row() {
                Ok(Some(row)) => self.decode(row.values()),
                Ok(None) => {
                    exhausted = true;
                    break;
                }
                Err(e) => Err(e),
            };
            match decoded {
                Ok(record) => parents.push(record),
                Err(e) => {
                    cursor.close();
                    return Err(e);
                }
            }
        }
        if exhausted {
            cursor.close();
        } else {
            self.cursor = Some(cursor);
        }

        if parents.is_empty() {
            return Ok(());
        }
        for relation in &self.plan.batched {
            load_batch(self.conn, relation, &mut parents, self.log_statements)?;
        }
        self.page.extend(parents);
        Ok(())
    }

    fn decode(&self, values: &[Value]) -> Result<M> {
        let mut record = M::default();
        decode_columns(
            &mut record,
            self.plan.columns.iter().map(String::as_str),
            values,
        )?;
        for joined in &self.plan.joined {
            decode_joined(&mut record, joined, values)?;
        }
        let state = record.state_mut();
        state.set_persisted(true);
        for reason in &self.plan.not_writable {
            state.mark_not_writable(*reason);
        }
        Ok(record)
    }
}

impl<'c, M: Model, C: Connection + 'c> Iterator for ResultSet<'c, M, C> {
    type Item = Result<M>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != State::Open {
            return None;
        }
        match self.advance() {
            Ok(true) => Some(self.current()),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<'c, M: Model, C: Connection + 'c> Drop for ResultSet<'c, M, C> {
    fn drop(&mut self) {
        self.release();
    }
}
