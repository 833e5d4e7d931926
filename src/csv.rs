//! Csv scenario input and account-state output.
//!
//! A scenario file is a flat `op,a,b,amount,note` table; `a` and `b` are
//! generic ids whose meaning depends on the op (account, sponsor,
//! offering, request or package).

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::model::{AccountStatus, PackageAction};
use crate::{AccountId, Amount, Command};

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized op '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: {op} missing {field}")]
    MissingField {
        line: usize,
        op: String,
        field: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    a: Option<u64>,
    b: Option<u64>,
    amount: Option<f64>,
    note: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    account: AccountId,
    balance: String,
    withdrawable: String,
    status: &'static str,
}

/// Read engine commands from a csv scenario file
pub fn read_commands(path: impl AsRef<Path>) -> impl Iterator<Item = Result<Command, CsvError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            parse_row(line, row)
        })
}

fn parse_row(line: usize, row: InputRow) -> Result<Command, CsvError> {
    let op = row.op.as_str();
    let need_a = |field| {
        row.a.ok_or(CsvError::MissingField {
            line,
            op: op.to_string(),
            field,
        })
    };
    let need_b = |field| {
        row.b.ok_or(CsvError::MissingField {
            line,
            op: op.to_string(),
            field,
        })
    };
    let need_amount = || {
        row.amount
            .map(Amount::from_float)
            .ok_or(CsvError::MissingField {
                line,
                op: op.to_string(),
                field: "amount",
            })
    };
    let note = row.note.clone().filter(|s| !s.is_empty());

    match op {
        "register" => Ok(Command::Register {
            account: need_a("account")? as AccountId,
            sponsor: row.b.map(|s| s as AccountId),
        }),
        "offering" => Ok(Command::AddOffering {
            id: need_a("offering")? as u32,
            name: note.unwrap_or_else(|| format!("offering-{}", row.a.unwrap_or_default())),
            price: need_amount()?,
        }),
        "deactivate" => Ok(Command::Deactivate {
            account: need_a("account")? as AccountId,
        }),
        "purchase" => Ok(Command::Purchase {
            account: need_a("account")? as AccountId,
            offering: need_b("offering")? as u32,
        }),
        "transfer" => Ok(Command::Transfer {
            from: need_a("from")? as AccountId,
            to: need_b("to")? as AccountId,
            amount: need_amount()?,
        }),
        "refill_request" => Ok(Command::RequestRefill {
            account: need_a("account")? as AccountId,
            amount: need_amount()?,
            proof: note.unwrap_or_default(),
        }),
        "refill_approve" | "refill_reject" => Ok(Command::ResolveRefill {
            request: need_a("request")?,
            approve: op == "refill_approve",
            notes: note,
        }),
        "withdraw_request" => Ok(Command::RequestWithdrawal {
            account: need_a("account")? as AccountId,
            amount: need_amount()?,
            wallet_address: note.unwrap_or_default(),
        }),
        "withdraw_approve" | "withdraw_reject" => Ok(Command::ResolveWithdrawal {
            request: need_a("request")?,
            approve: op == "withdraw_approve",
            notes: note,
        }),
        "package_withdraw" | "package_remine" => Ok(Command::PackageAction {
            account: need_a("account")? as AccountId,
            package: need_b("package")?,
            action: if op == "package_withdraw" {
                PackageAction::Withdraw
            } else {
                PackageAction::Remine
            },
        }),
        "bonus_batch" => Ok(Command::RunBonusBatch),
        other => Err(CsvError::UnrecognizedOp {
            line,
            op: other.to_string(),
        }),
    }
}

/// write account states to stdout in csv format
pub fn write_accounts(
    accounts: impl IntoIterator<Item = (AccountId, Amount, Amount, AccountStatus)>,
) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    for (account, balance, withdrawable, status) in accounts {
        let row = OutputRow {
            account,
            balance: balance.to_string(),
            withdrawable: withdrawable.to_string(),
            status: status.as_str(),
        };
        writer.serialize(&row).expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn read_register_with_sponsor() {
        let file = write_csv("op,a,b,amount,note\nregister,2,1,,\n");
        let results: Vec<_> = read_commands(file.path()).collect();
        assert_eq!(results.len(), 1);

        let cmd = results.into_iter().next().unwrap().unwrap();
        match cmd {
            Command::Register { account, sponsor } => {
                assert_eq!(account, 2);
                assert_eq!(sponsor, Some(1));
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn read_offering_with_name() {
        let file = write_csv("op,a,b,amount,note\noffering,1,,100.0,Bronze Plan\n");
        let cmd = read_commands(file.path()).next().unwrap().unwrap();
        match cmd {
            Command::AddOffering { id, name, price } => {
                assert_eq!(id, 1);
                assert_eq!(name, "Bronze Plan");
                assert_eq!(price, Amount::from_float(100.0));
            }
            _ => panic!("expected offering"),
        }
    }

    #[test]
    fn read_transfer() {
        let file = write_csv("op,a,b,amount,note\ntransfer,2,3,25.5,\n");
        let cmd = read_commands(file.path()).next().unwrap().unwrap();
        match cmd {
            Command::Transfer { from, to, amount } => {
                assert_eq!(from, 2);
                assert_eq!(to, 3);
                assert_eq!(amount, Amount::from_float(25.5));
            }
            _ => panic!("expected transfer"),
        }
    }

    #[test]
    fn read_withdrawal_roundtrip_ops() {
        let file = write_csv(
            "op,a,b,amount,note\nwithdraw_request,1,,50.0,TXkeb1CzJbwRVoSxk5TnXT1CZFiDDFB2Jh\nwithdraw_reject,1,,,invalid address\n",
        );
        let cmds: Vec<_> = read_commands(file.path()).map(Result::unwrap).collect();
        assert!(matches!(
            &cmds[0],
            Command::RequestWithdrawal { account: 1, .. }
        ));
        match &cmds[1] {
            Command::ResolveWithdrawal {
                request,
                approve,
                notes,
            } => {
                assert_eq!(*request, 1);
                assert!(!*approve);
                assert_eq!(notes.as_deref(), Some("invalid address"));
            }
            _ => panic!("expected withdrawal resolution"),
        }
    }

    #[test]
    fn read_package_actions() {
        let file = write_csv("op,a,b,amount,note\npackage_withdraw,1,4,,\npackage_remine,1,4,,\n");
        let cmds: Vec<_> = read_commands(file.path()).map(Result::unwrap).collect();
        assert!(matches!(
            cmds[0],
            Command::PackageAction {
                account: 1,
                package: 4,
                action: PackageAction::Withdraw
            }
        ));
        assert!(matches!(
            cmds[1],
            Command::PackageAction {
                action: PackageAction::Remine,
                ..
            }
        ));
    }

    #[test]
    fn read_bonus_batch() {
        let file = write_csv("op,a,b,amount,note\nbonus_batch,,,,\n");
        let cmd = read_commands(file.path()).next().unwrap().unwrap();
        assert!(matches!(cmd, Command::RunBonusBatch));
    }

    #[test]
    fn read_with_whitespace() {
        let file = write_csv("op, a, b, amount, note\nregister, 1, , ,\n");
        let results: Vec<_> = read_commands(file.path()).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn read_returns_error_for_unknown_op() {
        let file = write_csv("op,a,b,amount,note\nunknown,1,,10.0,\n");
        let results: Vec<_> = read_commands(file.path()).collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::UnrecognizedOp { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_missing_amount() {
        let file = write_csv("op,a,b,amount,note\ntransfer,1,2,,\n");
        let results: Vec<_> = read_commands(file.path()).collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(
            err,
            CsvError::MissingField {
                line: 2,
                field: "amount",
                ..
            }
        ));
    }

    #[test]
    fn read_returns_error_for_missing_account() {
        let file = write_csv("op,a,b,amount,note\npurchase,,1,,\n");
        let results: Vec<_> = read_commands(file.path()).collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(
            err,
            CsvError::MissingField {
                line: 2,
                field: "account",
                ..
            }
        ));
    }
}
