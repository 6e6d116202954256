//! Reactive wrappers around the fetch functions. Each resource carries its
//! own loading state; errors come back as display strings.

use crate::api::ApiClient;
use crate::booking::{self, BookingView};
use crate::checkout::{BrowserCheckout, Contact, PaymentSuccess};
use crate::conversation::{self, ConversationView};
use crate::message::{self, Msg};
use crate::payment::{self, PaymentRecord};
use crate::state::{Identity, Session};
use leptos::logging::error;
use leptos::*;

/// Mirrors the session into a signal and provides both as context.
pub fn provide_session(session: Session) -> ReadSignal<Option<Identity>> {
    let (identity, set_identity) = create_signal(session.identity());
    let subscription = session.subscribe(move |identity| set_identity.set(identity.cloned()));
    let owner = session.clone();
    on_cleanup(move || owner.unsubscribe(subscription));
    provide_context(session);
    provide_context(identity);
    identity
}

pub fn use_session() -> Session {
    expect_context::<Session>()
}

pub fn use_identity() -> ReadSignal<Option<Identity>> {
    expect_context::<ReadSignal<Option<Identity>>>()
}

pub fn use_api() -> ApiClient {
    expect_context::<ApiClient>()
}

fn user_id(identity: ReadSignal<Option<Identity>>) -> impl Fn() -> Option<String> {
    move || identity.get().map(|identity| identity.id)
}

pub fn use_bookings() -> Resource<Option<String>, Result<Vec<BookingView>, String>> {
    let api = use_api();
    create_local_resource(user_id(use_identity()), move |user_id| {
        let api = api.clone();
        async move {
            let Some(user_id) = user_id else {
                return Ok(vec![]);
            };
            booking::fetch_bookings(&api, &user_id).await.map_err(|err| {
                error!("Bookings for {user_id}: {err}");
                err.to_string()
            })
        }
    })
}

/// A failed history fetch shows as an empty history.
pub fn use_payment_history(
    booking_id: impl Fn() -> Option<String> + 'static,
) -> Resource<Option<String>, Vec<PaymentRecord>> {
    let api = use_api();
    create_local_resource(booking_id, move |booking_id| {
        let api = api.clone();
        async move {
            match booking_id {
                Some(booking_id) => {
                    let result = payment::fetch_payment_history(&api, &booking_id).await;
                    payment::payments_or_empty(&booking_id, result)
                }
                None => vec![],
            }
        }
    })
}

pub fn use_conversations() -> Resource<Option<String>, Result<Vec<ConversationView>, String>> {
    let api = use_api();
    create_local_resource(user_id(use_identity()), move |user_id| {
        let api = api.clone();
        async move {
            if user_id.is_none() {
                return Ok(vec![]);
            }
            conversation::fetch_conversations(&api)
                .await
                .map_err(|err| err.to_string())
        }
    })
}

pub fn use_messages(
    conversation_id: impl Fn() -> Option<String> + 'static,
) -> Resource<Option<String>, Result<Vec<Msg>, String>> {
    let api = use_api();
    create_local_resource(conversation_id, move |conversation_id| {
        let api = api.clone();
        async move {
            match conversation_id {
                Some(conversation_id) => message::fetch_messages(&api, &conversation_id)
                    .await
                    .map_err(|err| err.to_string()),
                None => Ok(vec![]),
            }
        }
    })
}

/// Creates the order, runs the checkout and, once the gateway reports
/// success, has the backend verify the payment. `done` hears the outcome;
/// a dismissed checkout never calls it.
pub fn start_payment(
    api: ApiClient,
    razorpay_key: Option<String>,
    booking_id: String,
    amount: f64,
    contact: Contact,
    done: impl Fn(Result<(), String>) + Clone + 'static,
) {
    spawn_local(async move {
        let verify_api = api.clone();
        let verify_booking = booking_id.clone();
        let verified = done.clone();
        let on_success = move |success: PaymentSuccess| {
            spawn_local(async move {
                let result = payment::verify_payment(&verify_api, &verify_booking, &success)
                    .await
                    .map_err(|err| {
                        error!("Verification for booking {verify_booking}: {err}");
                        err.to_string()
                    });
                verified(result);
            });
        };
        let opened = payment::pay_booking(
            &api,
            &BrowserCheckout,
            razorpay_key.as_deref(),
            &booking_id,
            amount,
            &contact,
            on_success,
        )
        .await;
        if let Err(err) = opened {
            error!("Payment for booking {booking_id}: {err}");
            done(Err(err.to_string()));
        }
    });
}
