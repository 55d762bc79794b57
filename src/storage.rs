//! Bet record storage.
//!
//! Provides the storage lock shared by every connection:
//! - `BetStore`: append/scan interface of a record store
//! - `CsvBetStore`: headerless CSV file, one row per bet
//! - `MemoryBetStore`: in-process store
//! - `BetLedger`: a store behind a mutex, with the winner scan

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, trace, warn};

use crate::lottery::WinnerPredicate;
use crate::protocol::{Bet, BetBuilder, BetField};

/// A persistent sequence of bets.
///
/// Implementations are not required to be internally synchronized; callers go
/// through [`BetLedger`], which serializes every access.
pub trait BetStore: Send {
    fn append_records(&mut self, bets: &[Bet]) -> io::Result<()>;

    fn scan_records(&mut self) -> io::Result<Vec<Bet>>;
}

/// Bets stored as CSV rows in the field order
/// agency, first name, last name, document, birthdate, number.
#[derive(Debug)]
pub struct CsvBetStore {
    path: PathBuf,
}

impl CsvBetStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BetStore for CsvBetStore {
    fn append_records(&mut self, bets: &[Bet]) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for bet in bets {
            writer.serialize(bet)?;
        }
        writer.flush()?;

        trace!(path = %self.path.display(), count = bets.len(), "Appended bets");
        Ok(())
    }

    fn scan_records(&mut self) -> io::Result<Vec<Bet>> {
        // Nothing has been uploaded yet
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;

        let mut bets = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    warn!(row, error = %e, "Skipping unreadable bet row");
                    continue;
                }
            };
            if record.len() != BetField::ALL.len() {
                warn!(row, fields = record.len(), "Skipping malformed bet row");
                continue;
            }

            let builder = BetField::ALL
                .iter()
                .zip(record.iter())
                .fold(BetBuilder::new(), |builder, (field, value)| {
                    builder.with(*field, value)
                });

            match builder.build() {
                Ok(bet) => bets.push(bet),
                Err(e) => warn!(row, error = %e, "Skipping invalid bet row"),
            }
        }

        Ok(bets)
    }
}

/// Bets kept in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryBetStore {
    bets: Vec<Bet>,
}

impl MemoryBetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BetStore for MemoryBetStore {
    fn append_records(&mut self, bets: &[Bet]) -> io::Result<()> {
        self.bets.extend_from_slice(bets);
        Ok(())
    }

    fn scan_records(&mut self) -> io::Result<Vec<Bet>> {
        Ok(self.bets.clone())
    }
}

/// The bet store shared by all connections, guarded by the storage lock.
pub struct BetLedger {
    store: Mutex<Box<dyn BetStore>>,
}

impl BetLedger {
    pub fn new(store: impl BetStore + 'static) -> Arc<Self> {
        info!("Initializing bet ledger");
        Arc::new(Self {
            store: Mutex::new(Box::new(store)),
        })
    }

    /// Append a whole upload while holding the lock.
    pub fn append(&self, bets: &[Bet]) -> io::Result<()> {
        if bets.is_empty() {
            return Ok(());
        }

        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.append_records(bets)?;
        debug!(count = bets.len(), "Stored bets");
        Ok(())
    }

    /// Every stored bet, read under the lock.
    pub fn scan(&self) -> io::Result<Vec<Bet>> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        store.scan_records()
    }

    /// Documents of the bets placed through `agency` that won.
    ///
    /// The lock is held for the entire scan so no record is observed half
    /// written.
    pub fn winners(
        &self,
        agency: u32,
        predicate: &dyn WinnerPredicate,
    ) -> io::Result<Vec<String>> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);

        let winners = store
            .scan_records()?
            .into_iter()
            .filter(|bet| bet.agency_id() == Some(agency) && predicate.is_winner(bet))
            .map(|bet| bet.document().to_owned())
            .collect();

        Ok(winners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lottery::WinningNumber;
    use crate::protocol::bet::sample_bet;
    use std::thread;

    fn temp_csv(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "lottery_intake_{}_{}.csv",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[test]
    fn test_memory_append_scan() {
        let mut store = MemoryBetStore::new();
        let bets = vec![sample_bet("1", "1", "1"), sample_bet("2", "2", "2")];
        store.append_records(&bets).unwrap();
        store.append_records(&[sample_bet("3", "3", "3")]).unwrap();

        let scanned = store.scan_records().unwrap();
        assert_eq!(scanned.len(), 3);
        assert_eq!(scanned[..2], bets[..]);
    }

    #[test]
    fn test_csv_missing_file_is_empty() {
        let mut store = CsvBetStore::new(temp_csv("missing"));
        assert!(store.scan_records().unwrap().is_empty());
    }

    #[test]
    fn test_csv_append_scan() {
        let path = temp_csv("append_scan");
        let mut store = CsvBetStore::new(&path);

        let first = vec![
            sample_bet("1", "30904465", "7574"),
            sample_bet("1", "24807259", "1234"),
        ];
        store.append_records(&first).unwrap();

        // Commas and quotes in free text survive the round trip
        let quoted = BetBuilder::new()
            .with(BetField::Agency, "2")
            .with(BetField::FirstName, "Ana, \"Anita\"")
            .with(BetField::LastName, "D'Onofrio")
            .with(BetField::Document, "11111111")
            .with(BetField::Birthdate, "2000-01-01")
            .with(BetField::Number, "7574")
            .build()
            .unwrap();
        store.append_records(std::slice::from_ref(&quoted)).unwrap();

        let scanned = CsvBetStore::new(&path).scan_records().unwrap();
        assert_eq!(scanned.len(), 3);
        assert_eq!(scanned[..2], first[..]);
        assert_eq!(scanned[2], quoted);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_csv_skips_malformed_rows() {
        let path = temp_csv("malformed");
        std::fs::write(
            &path,
            "1,Ana,Lopez,123,2000-01-01,7574\nnot,enough,fields\n2,,Perez,456,2001-02-02,1\n",
        )
        .unwrap();

        let scanned = CsvBetStore::new(&path).scan_records().unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].document(), "123");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_csv_skips_unreadable_rows() {
        let path = temp_csv("unreadable");
        let mut contents = b"1,Ana,Lopez,123,2000-01-01,7574\n".to_vec();
        contents.extend_from_slice(b"1,\xff\xfe,Lopez,124,2000-01-01,7574\n");
        contents.extend_from_slice(b"1,Eva,Ruiz,125,1999-09-09,7574\n");
        std::fs::write(&path, contents).unwrap();

        let scanned = CsvBetStore::new(&path).scan_records().unwrap();
        let documents: Vec<_> = scanned.iter().map(Bet::document).collect();
        assert_eq!(documents, vec!["123", "125"]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_ledger_winners_filter_by_agency() {
        let ledger = BetLedger::new(MemoryBetStore::new());
        ledger
            .append(&[
                sample_bet("1", "100", "7574"),
                sample_bet("1", "101", "1"),
                sample_bet("2", "200", "7574"),
                sample_bet("01", "102", "7574"),
            ])
            .unwrap();

        let mut winners = ledger.winners(1, &WinningNumber::default()).unwrap();
        winners.sort();
        assert_eq!(winners, vec!["100".to_string(), "102".to_string()]);
        assert_eq!(
            ledger.winners(2, &WinningNumber::default()).unwrap(),
            vec!["200".to_string()]
        );
        assert!(ledger.winners(3, &WinningNumber::default()).unwrap().is_empty());
    }

    #[test]
    fn test_ledger_concurrent_appends() {
        let ledger = BetLedger::new(MemoryBetStore::new());

        let handles: Vec<_> = (0..8)
            .map(|agency| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..50 {
                        let bet = sample_bet(&agency.to_string(), &i.to_string(), "1");
                        ledger.append(&[bet.clone(), bet]).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let bets = ledger.scan().unwrap();
        assert_eq!(bets.len(), 8 * 50 * 2);
        // Each upload lands as an uninterrupted pair
        for pair in bets.chunks(2) {
            assert_eq!(pair[0], pair[1]);
        }
    }
}
