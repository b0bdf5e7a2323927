use kasir_core::domain::catalog::BundleCategory;
use kasir_core::ports::DisambiguationDomain;

/// Sentinel the selection prompts ask for when nothing fits.
pub const NO_MATCH_SENTINEL: &str = "-99999";

pub const TRANSLATOR: &str = r#"You convert a forwarded order-confirmation chat message into JSON for a liquor shop's order system.
Reply with JSON only, no prose.

An order message lists customer name, phone, products, address, payment method and optional voucher, notes, discount, delivery type and operator initials.
Reply with:
{
  "customer_name": string,
  "phone": string (digits only, local format 08...),
  "products": [{"kind": "item" | "bundle", "name": string, "quantity": integer}],
  "address": string (free text or map link, unchanged),
  "payment": "BCA" | "BRI" | "Cash" | "QRIS" | "Hutang" (anything else is Cash),
  "payment_settled": boolean (true when the message says paid / lunas),
  "discount_mode": "fixed" | "percentage",
  "discount": number (percent points for percentage, currency for fixed, 0 when absent),
  "notes": string (every special request, voucher redemption and favour),
  "delivery": "FD" | "I" | "EX" (default FD),
  "delay_conditions": ["rain" | "traffic" | "no_expedition" | "backlog"]
}

Rules:
- "(Paket)" means kind bundle, "(Item)" means kind item. Promos, merch, guarantees, coupons, vouchers, compliments, delivery packages and prizes are bundles.
- Product names are copied without the quantity; "3 botol Anggur Merah (Item)" is name "Anggur Merah", quantity 3. Missing quantities are 1.
- FD adds one guarantee bundle; I adds "Instant Delivery" (bundle, 1); EX adds "Express Delivery!!" (bundle, 1).
- Ice, cups and cigarettes mentioned in notes are also item lines. Stickers stay in notes only.
- A free-instant voucher replaces any delivery line with "Tukar Voc Instant dari Babe!" (bundle, 1) and sets delivery to I.
- Requests to void receipts reply {"cancel": ["<order number>", ...]}; without an order number reply {"fallback": "No order number was given to cancel."}.
- Requests to void every open order reply {"clear_open_orders": true}.
- When required fields (name, phone, products, address, payment) are missing reply {"fallback": "<what is missing and the expected format>"}."#;

pub const ITEM_SELECTION: &str = r#"You pick the catalog item that matches a customer's request.
You get a query and a list of candidates as "id: name" lines.
Reply with the id only. Prefer names ending in "- I" over "- O" unless "- O" is written explicitly.
If no candidate matches, reply -99999."#;

pub const BUNDLE_SELECTION: &str = r#"You pick the promo bundle that matches a customer's request.
You get a query and a list of candidates as "id: name" lines.
Match brand, variant and quantity exactly: quantities appear after "Paket" or before "Botol". Bundles end with a [Promo X] tag; pick the promo named in the query. Multi-product bundles joined by "+" only match when the query names every component.
Reply with the id (not the position) only. A wrong quantity is worse than no answer.
If no candidate matches, reply -99999."#;

const CATEGORY_SELECTION: &str = r#"You pick the single {category} entry that best matches a customer's request.
You get a query and a list of candidates as "id: name" lines.
Reply with the id only, for example 228431.
If no entry matches, reply -99999."#;

pub const NOTES_SUMMARY: &str = r#"You write a short, warm, informal thank-you line for a customer's order notes.
Mention the promo bundles ordered and the notes (voucher or free-instant redemptions included). One or two sentences, no bold text."#;

pub fn selection_instruction(domain: DisambiguationDomain) -> String {
    match domain {
        DisambiguationDomain::Item => ITEM_SELECTION.to_string(),
        DisambiguationDomain::Bundle(BundleCategory::Plain) => BUNDLE_SELECTION.to_string(),
        DisambiguationDomain::Bundle(category) => {
            CATEGORY_SELECTION.replace("{category}", category.as_str())
        }
    }
}
