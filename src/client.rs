use anyhow::{anyhow, bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, BasicHistory, Input};
use prettytable::{Cell, Row, Table};

use crate::{
    common::{PageID, TableID, TransactionID, RID},
    error::Error,
    instance::Instance,
    record::Record,
};

const HELP: &str = "\
begin                  start a transaction
insert <int>...        insert a record
delete <page> <slot>   delete the record at a slot
scan                   list every record
commit | abort         end the open transaction
flush                  write every dirty page
stats                  buffer pool and transaction counts
exit | quit            leave the shell

insert, delete and scan outside a transaction run in their own.";

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Output(String),
    Exit,
}

/// Line-oriented front end over one table of an [`Instance`].
pub struct Shell {
    instance: Instance,
    table_id: TableID,
    fields: usize,
    txn_id: Option<TransactionID>,
}

impl Shell {
    pub fn new(instance: Instance, table_id: TableID, fields: usize) -> Self {
        Self {
            instance,
            table_id,
            fields,
            txn_id: None,
        }
    }
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn run(mut self) -> Result<()> {
        println!("Welcome to heapdb!");
        println!("Type \"help\" for commands, \"exit\" or \"quit\" to exit.");
        let mut history = BasicHistory::new().max_entries(100).no_duplicates(true);
        loop {
            let Ok(line) = Input::<String>::with_theme(&ColorfulTheme::default())
                .with_prompt(self.prompt())
                .history_with(&mut history)
                .interact_text()
            else {
                break;
            };
            match self.execute(&line) {
                Ok(Outcome::Output(output)) => println!("{}", output),
                Ok(Outcome::Exit) => break,
                Err(e) => println!("ERROR: {:#}", e),
            }
        }
        self.instance.shutdown()?;
        println!("Bye!");
        Ok(())
    }

    fn prompt(&self) -> String {
        match self.txn_id {
            Some(txn_id) => format!("heapdb ({})", txn_id),
            None => "heapdb".to_string(),
        }
    }

    pub fn execute(&mut self, line: &str) -> Result<Outcome> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(Outcome::Output(String::new()));
        };
        let args = words.collect::<Vec<_>>();
        let output = match command {
            "begin" => {
                if let Some(txn_id) = self.txn_id {
                    bail!("{} is still open", txn_id);
                }
                let txn_id = self.instance.begin()?;
                self.txn_id = Some(txn_id);
                format!("BEGIN {}", txn_id)
            }
            "commit" => {
                let txn_id = self.take_transaction()?;
                self.instance.commit(txn_id)?;
                format!("COMMIT {}", txn_id)
            }
            "abort" => {
                let txn_id = self.take_transaction()?;
                self.instance.abort(txn_id)?;
                format!("ABORT {}", txn_id)
            }
            "insert" => {
                let values = args
                    .iter()
                    .map(|arg| arg.parse::<i32>().with_context(|| format!("bad value {}", arg)))
                    .collect::<Result<Vec<_>>>()?;
                if values.len() != self.fields {
                    bail!("expected {} values, got {}", self.fields, values.len());
                }
                let table_id = self.table_id;
                let RID(page_id, slot) = self.with_transaction(|instance, txn_id| {
                    instance.insert(txn_id, table_id, &values)
                })?;
                format!("INSERT page {} slot {}", page_id.page_number, slot)
            }
            "delete" => {
                let &[page_number, slot] = &args[..] else {
                    bail!("usage: delete <page> <slot>");
                };
                let page_number = page_number
                    .parse::<u32>()
                    .with_context(|| format!("bad page number {}", page_number))?;
                let slot = slot
                    .parse::<u32>()
                    .with_context(|| format!("bad slot {}", slot))?;
                let rid = RID(PageID::new(self.table_id, page_number), slot);
                self.with_transaction(|instance, txn_id| instance.delete(txn_id, rid))?;
                format!("DELETE page {} slot {}", page_number, slot)
            }
            "scan" => {
                let table_id = self.table_id;
                let records = self
                    .with_transaction(|instance, txn_id| instance.scan(Some(txn_id), table_id))?;
                render_records(&records, self.fields)
            }
            "flush" => {
                self.instance.flush()?;
                "FLUSH".to_string()
            }
            "stats" => {
                let stats = self.instance.stats()?;
                format!(
                    "resident pages: {}/{}\nactive transactions: {}",
                    stats.resident_pages,
                    stats.capacity,
                    stats.active_transactions.len()
                )
            }
            "help" => HELP.to_string(),
            "exit" | "quit" => return Ok(Outcome::Exit),
            _ => bail!("unknown command {}, try \"help\"", command),
        };
        Ok(Outcome::Output(output))
    }

    fn take_transaction(&mut self) -> Result<TransactionID> {
        self.txn_id
            .take()
            .ok_or_else(|| anyhow!("no transaction is open"))
    }

    /// Runs `f` in the open transaction, or in a fresh one that commits on
    /// success. A lock timeout aborts the transaction either way.
    fn with_transaction<T>(
        &mut self,
        f: impl FnOnce(&Instance, TransactionID) -> Result<T>,
    ) -> Result<T> {
        let (txn_id, autocommit) = match self.txn_id {
            Some(txn_id) => (txn_id, false),
            None => (self.instance.begin()?, true),
        };
        match f(&self.instance, txn_id) {
            Ok(value) => {
                if autocommit {
                    self.instance.commit(txn_id)?;
                }
                Ok(value)
            }
            Err(e) => {
                let timed_out = matches!(
                    e.downcast_ref::<Error>(),
                    Some(error) if error.is_transaction_aborted()
                );
                if autocommit || timed_out {
                    self.instance.abort(txn_id)?;
                    self.txn_id = None;
                }
                Err(e)
            }
        }
    }
}

fn render_records(records: &[Record], fields: usize) -> String {
    let mut table_view = Table::new();
    let mut titles = vec![Cell::new("page"), Cell::new("slot")];
    titles.extend((0..fields).map(|i| Cell::new(&format!("f{}", i))));
    table_view.set_titles(Row::new(titles));
    for record in records {
        let mut cells = match record.rid {
            Some(RID(page_id, slot)) => vec![
                Cell::new(&page_id.page_number.to_string()),
                Cell::new(&slot.to_string()),
            ],
            None => vec![Cell::new(""), Cell::new("")],
        };
        cells.extend(record.values().iter().map(|v| Cell::new(&v.to_string())));
        table_view.add_row(Row::new(cells));
    }
    table_view.to_string()
}
