use crate::submitter::TransactionArgs;
use clap::Parser;

/// Submit a withdraw transaction to the asset_management contract
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Transaction arguments, forwarded verbatim. Only the first two are used.
    #[arg(num_args = 0.., allow_hyphen_values = true, allow_negative_numbers = true)]
    pub args: Vec<String>,
}

impl Cli {
    pub fn transaction_args(&self) -> TransactionArgs {
        TransactionArgs::from_positional(&self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_positionals() {
        let cli = Cli::try_parse_from(["asset-withdraw", "acct-42", "100"]).unwrap();
        assert_eq!(
            cli.transaction_args().as_slice(),
            &[Some("acct-42".to_string()), Some("100".to_string())]
        );
    }

    #[test]
    fn test_no_positionals() {
        let cli = Cli::try_parse_from(["asset-withdraw"]).unwrap();
        assert_eq!(cli.transaction_args().as_slice(), &[None, None]);
    }

    #[test]
    fn test_extra_and_negative_values() {
        let cli = Cli::try_parse_from(["asset-withdraw", "acct-42", "-100", "ignored"]).unwrap();
        assert_eq!(
            cli.transaction_args().as_slice(),
            &[Some("acct-42".to_string()), Some("-100".to_string())]
        );
    }
}
