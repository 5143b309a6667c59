//! One routine per screen of the wallet conversation.
//!
//! Every step renders its prompt, waits for the answer, validates it and
//! returns the next state. Failures carry the recovery chosen here, since
//! only the step knows which menu is its parent.

use std::fmt::Write as _;

use tracing::{debug, info};

use super::context::Conversation;
use super::recovery::{Failure, Recover, Recovery, StepResult};
use crate::error::FlowError;
use crate::events::{OptionStyle, Prompt, PromptOption};
use crate::ratelimit::ActionKey;
use crate::session::{SessionState, WalletRef};
use crate::util::truncate_str;
use crate::wallet::{Network, TxKind, format_amount, to_minor_units};

/// Component ids used on prompts.
pub mod ids {
    /// Generate a new wallet.
    pub const CREATE: &str = "create";
    /// Import a wallet from a private key.
    pub const IMPORT: &str = "import";
    /// Start the send flow.
    pub const SEND: &str = "send";
    /// Show the balance.
    pub const BALANCE: &str = "balance";
    /// Show recent transactions.
    pub const HISTORY: &str = "history";
    /// Show help.
    pub const HELP: &str = "help";
    /// Clear bot messages.
    pub const CLEAR: &str = "clear";
    /// Return to network selection.
    pub const BACK: &str = "back";
    /// Confirm a pending transfer.
    pub const CONFIRM_SEND: &str = "confirm_send";
    /// Cancel a pending transfer.
    pub const CANCEL_SEND: &str = "cancel_send";
}

fn menu(wallet: &WalletRef) -> SessionState {
    SessionState::WalletActions {
        wallet: wallet.clone(),
    }
}

/// Network selection: offer the three networks and record the choice.
pub async fn select_network(conv: Conversation<'_>) -> StepResult {
    conv.check_rate(ActionKey::NetworkSelection)
        .recover(Recovery::Discard)?;
    conv.ctx
        .registry
        .transition(conv.user, SessionState::NetworkSelection)
        .await;

    let prompt = Prompt::new("Select Network", "Which network do you want to use?").options(
        Network::ALL
            .into_iter()
            .map(|n| PromptOption::new(n.id(), n.label())),
    );
    let choice = conv
        .choose("network selection", &prompt)
        .await
        .recover(Recovery::Discard)?;

    if !conv.ctx.validator.validate_network(&choice) {
        return Err(Failure::new(FlowError::invalid("network"), Recovery::Discard));
    }
    let network: Network = choice
        .parse()
        .map_err(|_| Failure::new(FlowError::invalid("network"), Recovery::Discard))?;

    info!(user = %conv.user, %network, "network selected");
    Ok(SessionState::WalletOptions { network })
}

/// Wallet options: create a fresh wallet or move on to import.
pub async fn wallet_options(conv: Conversation<'_>, network: Network) -> StepResult {
    let prompt = Prompt::new(
        "Wallet Options",
        format!("Network: **{network}**\nCreate a new wallet or import an existing one?"),
    )
    .options([
        PromptOption::new(ids::CREATE, "Create New Wallet"),
        PromptOption::new(ids::IMPORT, "Import Existing Wallet").with_style(OptionStyle::Secondary),
    ]);
    let choice = conv
        .choose("wallet options", &prompt)
        .await
        .recover(Recovery::Discard)?;

    match choice.as_str() {
        ids::CREATE => create_wallet(conv, network).await,
        ids::IMPORT => Ok(SessionState::ImportingWallet { network }),
        _ => Err(Failure::new(FlowError::invalid("wallet option"), Recovery::Discard)),
    }
}

async fn create_wallet(conv: Conversation<'_>, network: Network) -> StepResult {
    let retry = Recovery::Resume(SessionState::WalletOptions { network });
    let created = conv
        .ctx
        .wallet
        .generate_wallet(conv.user, network)
        .await
        .map_err(FlowError::from)
        .recover(retry)?;

    conv.notify(&Prompt::new(
        "Wallet Created",
        format!(
            "Network: **{network}**\nAddress: `{}`\nPrivate key: `{}`\nRecovery phrase: `{}`\n\nStore the key and phrase somewhere safe. They will not be shown again.",
            created.address, created.private_key, created.mnemonic
        ),
    ))
    .await;

    info!(user = %conv.user, %network, address = %created.address, "wallet created");
    Ok(menu(&WalletRef::new(network, created.address)))
}

/// Import: read a private key, delete it from the chat, import it.
pub async fn import_wallet(conv: Conversation<'_>, network: Network) -> StepResult {
    let retry = || Recovery::Resume(SessionState::WalletOptions { network });

    let reply = conv
        .read_text(
            "private key",
            &Prompt::new(
                "Import Wallet",
                "Reply with your private key (hex). The message will be deleted once read.",
            ),
        )
        .await
        .recover(retry())?;

    if let Some(handle) = &reply.handle {
        conv.discard(handle).await;
    }

    let key = conv
        .ctx
        .validator
        .sanitize_input(reply.text().unwrap_or_default());
    if !conv.ctx.validator.validate_private_key(&key) {
        return Err(Failure::new(FlowError::invalid("private key"), retry()));
    }

    let imported = conv
        .ctx
        .wallet
        .import_wallet(&key, conv.user, network)
        .await
        .map_err(FlowError::from)
        .recover(retry())?;

    conv.notify(&Prompt::new(
        "Wallet Imported",
        format!("Network: **{network}**\nAddress: `{}`", imported.address),
    ))
    .await;

    info!(user = %conv.user, %network, address = %imported.address, "wallet imported");
    Ok(menu(&WalletRef::new(network, imported.address)))
}

/// The wallet actions menu.
///
/// Failures of the menu itself park the session here until the next trigger.
pub async fn wallet_actions(conv: Conversation<'_>, wallet: &WalletRef) -> StepResult {
    let park = || Recovery::Park(menu(wallet));

    conv.check_rate(ActionKey::WalletActions).recover(park())?;

    let prompt = Prompt::new(
        "Wallet",
        format!("Network: **{}**\nAddress: `{}`", wallet.network, wallet.address),
    )
    .options([
        PromptOption::new(ids::SEND, "Send KAS").with_style(OptionStyle::Success),
        PromptOption::new(ids::BALANCE, "Balance"),
        PromptOption::new(ids::HISTORY, "History"),
        PromptOption::new(ids::HELP, "Help").with_style(OptionStyle::Secondary),
        PromptOption::new(ids::CLEAR, "Clear Chat").with_style(OptionStyle::Secondary),
        PromptOption::new(ids::BACK, "Back").with_style(OptionStyle::Danger),
    ]);
    let choice = conv.choose("wallet actions", &prompt).await.recover(park())?;
    debug!(user = %conv.user, %choice, "wallet action chosen");

    let wallet = wallet.clone();
    match choice.as_str() {
        ids::SEND => Ok(SessionState::SendingKaspa { wallet }),
        ids::BALANCE => Ok(SessionState::CheckingBalance { wallet }),
        ids::HISTORY => Ok(SessionState::ViewingHistory { wallet }),
        ids::HELP => help(conv, &wallet).await,
        ids::CLEAR => clear_chat(conv, &wallet).await,
        ids::BACK => Ok(SessionState::NetworkSelection),
        _ => Err(Failure::new(FlowError::invalid("wallet action"), park())),
    }
}

/// Send flow: recipient, amount, confirmation, transfer.
///
/// Always ends back at the actions menu, whatever happens.
pub async fn send(conv: Conversation<'_>, wallet: &WalletRef) -> StepResult {
    let back = || Recovery::Resume(menu(wallet));
    let validator = &conv.ctx.validator;

    let reply = conv
        .read_text(
            "recipient address",
            &Prompt::new(
                "Send KAS",
                format!(
                    "Reply with the recipient's {} address.",
                    wallet.network.address_prefix()
                ),
            ),
        )
        .await
        .recover(back())?;
    let recipient = validator.sanitize_input(reply.text().unwrap_or_default());
    if !validator.validate_address(&recipient, wallet.network) {
        return Err(Failure::new(FlowError::invalid("recipient address"), back()));
    }

    let reply = conv
        .read_text(
            "amount",
            &Prompt::new("Send KAS", "How much KAS do you want to send?"),
        )
        .await
        .recover(back())?;
    let amount_text = validator.sanitize_input(reply.text().unwrap_or_default());
    let amount = validator
        .validate_amount(&amount_text)
        .then(|| to_minor_units(&amount_text))
        .flatten()
        .ok_or_else(|| Failure::new(FlowError::invalid("amount"), back()))?;

    let confirm = Prompt::new(
        "Confirm Transaction",
        format!(
            "Send **{}** to `{recipient}` on {}?",
            format_amount(amount),
            wallet.network
        ),
    )
    .options([
        PromptOption::new(ids::CONFIRM_SEND, "Confirm").with_style(OptionStyle::Success),
        PromptOption::new(ids::CANCEL_SEND, "Cancel").with_style(OptionStyle::Danger),
    ]);
    let choice = conv
        .choose_within("send confirmation", &confirm, conv.ctx.config.flow.confirm_timeout())
        .await
        .recover(back())?;

    if choice != ids::CONFIRM_SEND {
        info!(user = %conv.user, "transfer cancelled");
        conv.notify(&Prompt::notice("Transaction cancelled.")).await;
        return Ok(menu(wallet));
    }

    let tx_id = conv
        .ctx
        .wallet
        .send_funds(conv.user, amount, &recipient, wallet.network)
        .await
        .map_err(FlowError::from)
        .recover(back())?;

    info!(user = %conv.user, network = %wallet.network, amount, tx = %tx_id, "transfer submitted");
    let reference = conv
        .ctx
        .config
        .explorer_link(wallet.network, &tx_id)
        .map_or_else(|| format!("Transaction ID: `{tx_id}`"), |url| format!("[View transaction]({url})"));
    conv.notify(&Prompt::new(
        "Transaction Sent",
        format!("Sent **{}** to `{recipient}`.\n{reference}", format_amount(amount)),
    ))
    .await;

    Ok(menu(wallet))
}

/// Show native and token balances.
pub async fn balance(conv: Conversation<'_>, wallet: &WalletRef) -> StepResult {
    let back = || Recovery::Resume(menu(wallet));
    conv.check_rate(ActionKey::Balance).recover(back())?;

    let balance = conv
        .ctx
        .wallet
        .get_balance(conv.user, wallet.network)
        .await
        .map_err(FlowError::from)
        .recover(back())?;

    let mut body = format!("Address: `{}`\n**{}**", wallet.address, format_amount(balance.native));
    for token in &balance.tokens {
        let _ = write!(body, "\n{} {}", token.amount, token.ticker);
    }
    conv.notify(&Prompt::new("Balance", body)).await;

    Ok(menu(wallet))
}

/// Show the most recent transactions.
pub async fn history(conv: Conversation<'_>, wallet: &WalletRef) -> StepResult {
    let back = || Recovery::Resume(menu(wallet));
    conv.check_rate(ActionKey::History).recover(back())?;

    let entries = conv
        .ctx
        .wallet
        .get_history(&wallet.address, wallet.network)
        .await
        .map_err(FlowError::from)
        .recover(back())?;

    let limit = conv.ctx.config.flow.history_limit;
    let body = if entries.is_empty() {
        "No transactions yet.".to_string()
    } else {
        let mut body = String::new();
        for entry in entries.iter().take(limit) {
            let sign = match entry.kind {
                TxKind::Sent => '-',
                TxKind::Received => '+',
            };
            let _ = writeln!(
                body,
                "{sign}{} `{}`",
                format_amount(entry.amount),
                truncate_str(&entry.id, 16)
            );
        }
        body.trim_end().to_string()
    };
    conv.notify(&Prompt::new("Recent Transactions", body)).await;

    Ok(menu(wallet))
}

/// Static help text.
pub async fn help(conv: Conversation<'_>, wallet: &WalletRef) -> StepResult {
    conv.check_rate(ActionKey::Help)
        .recover(Recovery::Resume(menu(wallet)))?;

    let command = &conv.ctx.config.command;
    conv.notify(&Prompt::new(
        "Help",
        format!(
            "**Send KAS**: transfer funds to another address\n\
             **Balance**: show your current balance\n\
             **History**: show recent transactions\n\
             **Clear Chat**: remove bot messages from this chat\n\
             **Back**: choose a different network\n\n\
             Type `{command}` at any time to reopen the menu."
        ),
    ))
    .await;

    Ok(menu(wallet))
}

/// Remove bot messages from the direct chat.
pub async fn clear_chat(conv: Conversation<'_>, wallet: &WalletRef) -> StepResult {
    let back = || Recovery::Resume(menu(wallet));
    conv.check_rate(ActionKey::ClearChat).recover(back())?;

    let cleared = conv
        .ctx
        .transport
        .clear(conv.chat)
        .await
        .map_err(FlowError::from)
        .recover(back())?;
    debug!(user = %conv.user, cleared, "chat cleared");

    Ok(menu(wallet))
}
