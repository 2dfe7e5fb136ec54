use serde::Serialize;

pub type RowId = u64;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct KeywordRow {
    pub id: RowId,
    pub value: String,
}

/// Ordered keyword inputs. Rows may be removed down to zero.
#[derive(Debug, Default)]
pub struct KeywordRows {
    rows: Vec<KeywordRow>,
    next_id: RowId,
    focus: Option<RowId>,
}

impl KeywordRows {
    pub fn with_rows(count: usize) -> Self {
        let mut rows = Self::default();
        for _ in 0..count {
            rows.push_row();
        }
        rows
    }

    pub fn rows(&self) -> &[KeywordRow] {
        &self.rows
    }

    pub fn add_row(&mut self) -> RowId {
        let id = self.push_row();
        self.focus = Some(id);
        id
    }

    pub fn remove_row(&mut self, id: RowId) -> bool {
        let before = self.rows.len();
        self.rows.retain(|row| row.id != id);
        if self.focus == Some(id) {
            self.focus = None;
        }
        self.rows.len() != before
    }

    pub fn set_value(&mut self, id: RowId, value: &str) -> bool {
        match self.rows.iter_mut().find(|row| row.id == id) {
            Some(row) => {
                row.value = value.to_string();
                true
            }
            None => false,
        }
    }

    /// Non-blank trimmed values in row order.
    pub fn keywords(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.value.trim())
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }

    pub fn clear_values(&mut self) {
        for row in &mut self.rows {
            row.value.clear();
        }
    }

    /// Row whose input should receive focus; consumed on read.
    pub fn take_focus(&mut self) -> Option<RowId> {
        self.focus.take()
    }

    fn push_row(&mut self) -> RowId {
        self.next_id += 1;
        let id = self.next_id;
        self.rows.push(KeywordRow {
            id,
            value: String::new(),
        });
        id
    }
}
