use rand::Rng;

use crate::models::PurchaseRequest;

/// Appended to purchase requests that go through the escrow agent.
pub const ESCROW_STEPS: &str = "\nTransaction steps when using the escrow service:
The buyer pays the cost of the channel + 8% (±$3 minimum) service fee.
The seller confirms and agrees to use the escrow service.
The escrow agent verifies everything and assigns manager rights to the buyer.
After 7 days (or sooner if agreed), the escrow agent removes other managers and transfers full ownership to the buyer.
The funds are then released to the seller. Payments are sent instantly via all major payment methods.";

/// Appended to purchase requests settled directly between the parties.
pub const DIRECT_TRANSACTION_NOTE: &str = "\nDirect transaction without escrow agent.
Please communicate with the seller directly to complete the transaction.";

/// Seven-digit transaction reference.
pub fn random_transaction_id() -> u32 {
    rand::thread_rng().gen_range(1_000_000..10_000_000)
}

/// Room and inbox summary line for a purchase request.
pub fn purchase_summary(label: &str) -> String {
    format!("Purchase Request: {}", label.trim())
}

pub fn purchase_request_body(request: &PurchaseRequest, transaction_id: u32) -> String {
    let mut body = format!(
        "Request to Purchase {}\nTransaction ID: {}\nTransaction Amount: ${}\nPayment Method: {}",
        request.label.trim(),
        transaction_id,
        request.price,
        request.payment_method.label()
    );

    if let Some(address) = request.effective_wallet_address() {
        body.push_str("\nBitcoin Wallet: ");
        body.push_str(address);
    }

    body.push('\n');
    body.push_str(if request.use_escrow {
        ESCROW_STEPS
    } else {
        DIRECT_TRANSACTION_NOTE
    });
    body
}
