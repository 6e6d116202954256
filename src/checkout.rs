//! Razorpay checkout.
//!
//! The page-facing parts (script tag, `Razorpay` constructor) live in
//! [`BrowserCheckout`]; everything else goes through [`CheckoutHost`].

use js_sys::{Function, Object, Promise, Reflect};
use leptos::logging::{log, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

pub const CHECKOUT_SCRIPT: &str = "https://checkout.razorpay.com/v1/checkout.js";
pub const CURRENCY: &str = "INR";
const MERCHANT_NAME: &str = "Guidebook";
const THEME_COLOR: &str = "#2563eb";

#[wasm_bindgen]
extern "C" {
    type Razorpay;

    #[wasm_bindgen(constructor, catch)]
    fn new(options: &JsValue) -> Result<Razorpay, JsValue>;

    #[wasm_bindgen(method)]
    fn open(this: &Razorpay);
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Razorpay key is not configured")]
    MissingKey,

    #[error("Could not load the payment gateway")]
    ScriptLoad,

    #[error("Invalid payment amount {0}")]
    InvalidAmount(f64),

    #[error("Payment gateway error {0}")]
    Js(String),
}

// we must manually implement serde::Serialize
impl serde::Serialize for CheckoutError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

/// Order created by the backend for one payment attempt.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Order {
    pub id: String,
    /// In minor units, as the gateway reports it.
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    #[serde(rename = "contact")]
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Theme {
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notes {
    pub booking_id: String,
}

/// Options passed to the `Razorpay` constructor, minus the callbacks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutOptions {
    pub key: String,
    pub amount: u64,
    pub currency: String,
    pub order_id: String,
    pub name: String,
    pub description: String,
    pub prefill: Contact,
    pub notes: Notes,
    pub theme: Theme,
}

/// What the gateway hands to the success handler. Fields the gateway adds
/// beyond the three named ones are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentSuccess {
    #[serde(default)]
    pub razorpay_payment_id: String,
    #[serde(default)]
    pub razorpay_order_id: Option<String>,
    #[serde(default)]
    pub razorpay_signature: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PaymentSuccess {
    /// Never fails: a payload of the wrong shape still reaches the handler,
    /// and the backend's verification rejects it.
    pub fn from_response(response: Value) -> Self {
        match serde_json::from_value(response) {
            Ok(success) => success,
            Err(err) => {
                warn!("Unexpected payment response shape {err}");
                Self::default()
            }
        }
    }
}

pub fn minor_units(amount: f64) -> Result<u64, CheckoutError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(CheckoutError::InvalidAmount(amount));
    }
    Ok((amount * 100.0).round() as u64)
}

/// The gateway's public key, or `MissingKey` when the build has none.
pub fn require_key(key: Option<&str>) -> Result<&str, CheckoutError> {
    key.filter(|key| !key.trim().is_empty())
        .ok_or(CheckoutError::MissingKey)
}

pub fn checkout_options(
    key: Option<&str>,
    order: &Order,
    booking_id: &str,
    amount: f64,
    contact: &Contact,
) -> Result<CheckoutOptions, CheckoutError> {
    let key = require_key(key)?;
    Ok(CheckoutOptions {
        key: key.to_owned(),
        amount: minor_units(amount)?,
        currency: CURRENCY.to_owned(),
        order_id: order.id.clone(),
        name: MERCHANT_NAME.to_owned(),
        description: format!("Payment for booking {booking_id}"),
        prefill: contact.clone(),
        notes: Notes {
            booking_id: booking_id.to_owned(),
        },
        theme: Theme {
            color: THEME_COLOR.to_owned(),
        },
    })
}

pub type OnSuccess = Box<dyn FnOnce(PaymentSuccess)>;
pub type OnDismiss = Box<dyn FnOnce()>;

#[allow(async_fn_in_trait)]
pub trait CheckoutHost {
    /// Whether the `Razorpay` constructor is available.
    fn gateway_ready(&self) -> bool;

    /// Loads the script, reusing a tag that is still loading, and waits for
    /// it; `false` when it failed to load.
    async fn inject_script(&self, src: &str) -> bool;

    fn open(
        &self,
        options: &CheckoutOptions,
        on_success: OnSuccess,
        on_dismiss: OnDismiss,
    ) -> Result<(), CheckoutError>;
}

pub async fn load_checkout_script<H: CheckoutHost>(host: &H) -> bool {
    if host.gateway_ready() {
        return true;
    }
    host.inject_script(CHECKOUT_SCRIPT).await && host.gateway_ready()
}

/// Opens the checkout modal. The success payload reaches `on_success`
/// untouched; a dismissed modal is only logged.
pub async fn open_checkout<H, F>(
    host: &H,
    key: Option<&str>,
    order: &Order,
    booking_id: &str,
    amount: f64,
    contact: &Contact,
    on_success: F,
) -> Result<(), CheckoutError>
where
    H: CheckoutHost,
    F: FnOnce(PaymentSuccess) + 'static,
{
    let options = checkout_options(key, order, booking_id, amount, contact)?;
    if !load_checkout_script(host).await {
        return Err(CheckoutError::ScriptLoad);
    }
    let booking_id = booking_id.to_owned();
    host.open(
        &options,
        Box::new(on_success),
        Box::new(move || log!("Checkout dismissed for booking {booking_id}")),
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserCheckout;

fn js_error(err: JsValue) -> CheckoutError {
    CheckoutError::Js(format!("{err:?}"))
}

fn script_tag(src: &str) -> Option<web_sys::HtmlScriptElement> {
    leptos::document()
        .query_selector(&format!("script[src=\"{src}\"]"))
        .ok()
        .flatten()
        .and_then(|element| element.dyn_into::<web_sys::HtmlScriptElement>().ok())
}

fn new_script_tag(src: &str) -> Option<web_sys::HtmlScriptElement> {
    let document = leptos::document();
    let script = document
        .create_element("script")
        .ok()?
        .dyn_into::<web_sys::HtmlScriptElement>()
        .ok()?;
    script.set_src(src);
    document.body()?.append_child(&script).ok()?;
    Some(script)
}

impl CheckoutHost for BrowserCheckout {
    fn gateway_ready(&self) -> bool {
        Reflect::has(&leptos::window(), &"Razorpay".into()).unwrap_or(false)
    }

    async fn inject_script(&self, src: &str) -> bool {
        // A tag that is still here and not ready is still loading.
        let Some(script) = script_tag(src).or_else(|| new_script_tag(src)) else {
            return false;
        };
        let loaded = Promise::new(&mut |resolve: Function, _reject: Function| {
            let on_load = resolve.clone();
            let onload = Closure::once_into_js(move || {
                let _ = on_load.call1(&JsValue::NULL, &JsValue::TRUE);
            });
            let onerror = Closure::once_into_js(move || {
                let _ = resolve.call1(&JsValue::NULL, &JsValue::FALSE);
            });
            let _ = script.add_event_listener_with_callback("load", onload.unchecked_ref());
            let _ = script.add_event_listener_with_callback("error", onerror.unchecked_ref());
        });
        let loaded = match JsFuture::from(loaded).await {
            Ok(value) => value.as_bool().unwrap_or(false),
            Err(err) => {
                warn!("Checkout script failed {err:?}");
                false
            }
        };
        if !loaded {
            // Drop the failed tag so the next attempt loads it afresh.
            script.remove();
        }
        loaded
    }

    fn open(
        &self,
        options: &CheckoutOptions,
        on_success: OnSuccess,
        on_dismiss: OnDismiss,
    ) -> Result<(), CheckoutError> {
        let config = serde_wasm_bindgen::to_value(options)
            .map_err(|err| CheckoutError::Js(err.to_string()))?;
        let handler = Closure::once_into_js(move |response: JsValue| {
            let response = serde_wasm_bindgen::from_value::<Value>(response).unwrap_or_else(|err| {
                warn!("Unreadable payment response {err}");
                Value::Null
            });
            on_success(PaymentSuccess::from_response(response));
        });
        Reflect::set(&config, &"handler".into(), &handler).map_err(js_error)?;

        let modal = Object::new();
        let ondismiss = Closure::once_into_js(on_dismiss);
        Reflect::set(&modal, &"ondismiss".into(), &ondismiss).map_err(js_error)?;
        Reflect::set(&config, &"modal".into(), &modal).map_err(js_error)?;

        let checkout = Razorpay::new(&config).map_err(js_error)?;
        checkout.open();
        Ok(())
    }
}
