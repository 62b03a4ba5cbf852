//! Message texts sent to owners (Telegram Markdown)

use crate::chain::{Amount, ChainKind};
use crate::wallet::Wallet;

/// Successful sweep
pub fn sweep_success(wallet: &Wallet, amount: Amount, tx_hash: &str, explorer_url: &str) -> String {
    format!(
        "*Sweep complete*\n\
         Chain: {}\n\
         Amount: {}\n\
         From: `{}`\n\
         To: `{}`\n\
         Tx: `{}`\n\
         [View transaction]({})",
        wallet.chain.symbol(),
        wallet.chain.format_amount(amount),
        wallet.address,
        wallet.receiver_address,
        tx_hash,
        explorer_url
    )
}

/// Delegated wallet crossed its threshold but cannot be signed for
pub fn reauthorization_required(wallet: &Wallet, balance: Amount) -> String {
    format!(
        "*Action required*\n\
         Your {} wallet `{}` holds {}, above its sweep threshold.\n\
         It was connected without a private key, so it cannot be swept automatically. \
         Please send the funds to `{}` manually or re-authorise the wallet.",
        wallet.chain.symbol(),
        wallet.address,
        wallet.chain.format_amount(balance),
        wallet.receiver_address
    )
}

/// Retries exhausted
pub fn gave_up(wallet: &Wallet, attempts: u32, reason: &str) -> String {
    format!(
        "*Sweep failed*\n\
         {} wallet `{}` could not be swept after {} attempts.\n\
         Last error: `{}`\n\
         The sweep will be retried on the next check.",
        wallet.chain.symbol(),
        wallet.address,
        attempts,
        code_span_text(reason)
    )
}

/// Text safe inside a Markdown code span, where `_` and `*` are literal
fn code_span_text(text: &str) -> String {
    text.replace('`', "'")
}

/// Balance overview for one wallet
pub fn balance(wallet: &Wallet, balance: Amount) -> String {
    let threshold = if wallet.threshold == 0 {
        "any balance".to_string()
    } else {
        wallet.chain.format_amount(wallet.threshold)
    };

    format!(
        "{} `{}`\nBalance: {}\nSweeps at: {}\nReceiver: `{}`",
        wallet.chain.symbol(),
        wallet.address,
        wallet.chain.format_amount(balance),
        threshold,
        wallet.receiver_address
    )
}

/// Greeting for a new owner
pub fn welcome() -> String {
    let chains = ChainKind::ALL
        .iter()
        .map(|c| c.symbol())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "*Welcome!*\n\
         I watch your wallets and forward incoming funds to your receiver address.\n\
         Supported chains: {}\n\n\
         /setwallet - register a wallet\n\
         /checkbalance - show balances\n\
         /cancel - abort the current setup",
        chains
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::wallet_fixture;

    #[test]
    fn test_success_message_has_amount_and_link() {
        let wallet = wallet_fixture(ChainKind::Tron, 0);
        let url = ChainKind::Tron.explorer_tx_url("abc123");
        let text = sweep_success(&wallet, 900_000, "abc123", &url);

        assert!(text.contains("0.9 TRX"));
        assert!(text.contains("abc123"));
        assert!(text.contains("https://tronscan.org/#/transaction/abc123"));
        assert!(text.contains(&wallet.receiver_address));
    }

    #[test]
    fn test_balance_message_threshold() {
        let mut wallet = wallet_fixture(ChainKind::Solana, 0);
        assert!(balance(&wallet, 1).contains("any balance"));

        wallet.threshold = 1_500_000_000;
        assert!(balance(&wallet, 1).contains("1.5 SOL"));
    }

    #[test]
    fn test_gave_up_reason_is_code_span() {
        let wallet = wallet_fixture(ChainKind::Tron, 0);
        let text = gave_up(&wallet, 4, "Broadcast rejected: SERVER_BUSY `retry`");

        assert!(text.contains("4 attempts"));
        assert!(text.contains("`Broadcast rejected: SERVER_BUSY 'retry'`"));
        // Outside code spans every Markdown entity stays balanced
        let outside: String = text
            .split('`')
            .step_by(2)
            .collect();
        assert!(!outside.contains('_'));
        assert_eq!(text.matches('`').count() % 2, 0);
    }

    #[test]
    fn test_welcome_lists_chains() {
        let text = welcome();
        for chain in ChainKind::ALL {
            assert!(text.contains(chain.symbol()));
        }
    }
}
