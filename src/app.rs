use crate::api::ApiClient;
use crate::booking::BookingView;
use crate::checkout::Contact;
use crate::config::Config;
use crate::hooks::{
    provide_session, start_payment, use_api, use_bookings, use_payment_history, use_session,
};
use crate::login;
use crate::nav::Inbox;
use crate::state::{Identity, Session};
use crate::storage::{KeyValueStore, LocalStorage, TOKEN_KEY};
use leptos::ev::SubmitEvent;
use leptos::logging::{error, log, warn};
use leptos::*;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

/// Another tab signing in or out shows up here as a `storage` event.
fn watch_other_tabs(session: Session) {
    let on_storage = Closure::<dyn FnMut(web_sys::StorageEvent)>::new(
        move |event: web_sys::StorageEvent| {
            // No key: the other tab cleared all of storage.
            if event.key().map_or(true, |key| key == TOKEN_KEY) {
                session.reload();
            }
        },
    );
    if let Err(err) =
        window().add_event_listener_with_callback("storage", on_storage.as_ref().unchecked_ref())
    {
        warn!("Not following other tabs {err:?}");
    }
    on_storage.forget();
}

#[component]
pub fn App() -> impl IntoView {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("Invalid API_BASE_URL {err}");
            return view! { <p class="error">"The application is misconfigured."</p> }.into_view();
        }
    };
    let store: Rc<dyn KeyValueStore> = Rc::new(LocalStorage);
    let session = Session::restore(store.clone());
    watch_other_tabs(session.clone());
    provide_context(ApiClient::new(&config, store));
    provide_context(config);
    let identity = provide_session(session);

    view! {
        <main>
            {move || match identity.get() {
                Some(identity) => view! { <Dashboard identity=identity /> }.into_view(),
                None => view! { <SignIn /> }.into_view(),
            }}
        </main>
    }
    .into_view()
}

#[component]
fn SignIn() -> impl IntoView {
    let api = use_api();
    let session = use_session();
    let (email, set_email) = create_signal(String::new());
    let (password, set_password) = create_signal(String::new());
    let (failure, set_failure) = create_signal(None::<String>);
    let (pending, set_pending) = create_signal(false);

    let submit = move |ev: SubmitEvent| {
        ev.prevent_default();
        set_pending.set(true);
        set_failure.set(None);
        let api = api.clone();
        let session = session.clone();
        spawn_local(async move {
            let result =
                login::login(&api, &session, &email.get_untracked(), &password.get_untracked())
                    .await;
            // On success the session swaps this form out.
            match result {
                Ok(identity) => log!("Signed in as {}", identity.id),
                Err(err) => {
                    set_failure.set(Some(err.to_string()));
                    set_pending.set(false);
                }
            }
        });
    };

    view! {
        <form class="sign-in" on:submit=submit>
            <input
                type="email"
                placeholder="Email"
                on:input=move |ev| set_email.set(event_target_value(&ev))
                prop:value=email
            />
            <input
                type="password"
                placeholder="Password"
                on:input=move |ev| set_password.set(event_target_value(&ev))
                prop:value=password
            />
            <button type="submit" disabled=pending>
                "Sign in"
            </button>
            {move || failure.get().map(|failure| view! { <p class="error">{failure}</p> })}
        </form>
    }
}

#[component]
fn Dashboard(identity: Identity) -> impl IntoView {
    let session = use_session();
    let bookings = use_bookings();
    let on_paid = Callback::new(move |_: ()| bookings.refetch());
    let name = identity.name.clone().unwrap_or_else(|| identity.id.clone());
    let contact = store_value(Contact {
        name: name.clone(),
        ..Default::default()
    });

    view! {
        <header>
            <span>{name} " (" {identity.role.as_str()} ")"</span>
            <a href=identity.role.dashboard()>"Dashboard"</a>
            <button on:click=move |_| login::logout(&session)>"Sign out"</button>
        </header>
        <section class="bookings">
            <h2>"Bookings"</h2>
            <Suspense fallback=move || view! { <p>"Loading bookings..."</p> }>
                {move || {
                    bookings
                        .get()
                        .map(|result| match result {
                            Ok(list) if list.is_empty() => {
                                view! { <p>"No bookings yet."</p> }.into_view()
                            }
                            Ok(list) => {
                                list.into_iter()
                                    .map(|booking| {
                                        view! {
                                            <BookingCard
                                                booking=booking
                                                contact=contact.get_value()
                                                on_paid=on_paid
                                            />
                                        }
                                    })
                                    .collect_view()
                            }
                            Err(err) => view! { <p class="error">{err}</p> }.into_view(),
                        })
                }}
            </Suspense>
        </section>
        <Inbox />
    }
}

#[component]
fn BookingCard(booking: BookingView, contact: Contact, on_paid: Callback<()>) -> impl IntoView {
    let api = use_api();
    let razorpay_key = expect_context::<Config>().razorpay_key;
    let (show_payments, set_show_payments) = create_signal(false);
    let (notice, set_notice) = create_signal(None::<String>);

    let booking_id = booking.id.clone();
    let balance = booking.remaining_balance;
    let pay = move |_| {
        set_notice.set(None);
        let done = move |result: Result<(), String>| match result {
            Ok(()) => {
                set_notice.set(Some("Payment received".to_owned()));
                on_paid.call(());
            }
            Err(err) => set_notice.set(Some(err)),
        };
        start_payment(
            api.clone(),
            razorpay_key.clone(),
            booking_id.clone(),
            balance,
            contact.clone(),
            done,
        );
    };
    let history_id = booking.id.clone();

    view! {
        <article class="booking">
            <h3>{booking.guide_name}</h3>
            <p>{booking.start_date} " to " {booking.end_date} " (" {booking.duration} ")"</p>
            <p>"Languages: " {booking.guide_languages}</p>
            <p>"Status: " {booking.status} ", payment: " {booking.payment_status}</p>
            <p>
                "Budget " {booking.budget} ", paid " {booking.total_paid} ", due "
                {booking.remaining_balance}
            </p>
            {(balance > 0.0).then(|| view! { <button on:click=pay>"Pay balance"</button> })}
            <button on:click=move |_| {
                set_show_payments.update(|show| *show = !*show)
            }>"Payments"</button>
            {move || {
                show_payments
                    .get()
                    .then(|| view! { <PaymentHistory booking_id=history_id.clone() /> })
            }}
            {move || notice.get().map(|notice| view! { <p class="notice">{notice}</p> })}
        </article>
    }
}

#[component]
fn PaymentHistory(booking_id: String) -> impl IntoView {
    let payments = use_payment_history(move || Some(booking_id.clone()));
    view! {
        <Suspense fallback=move || view! { <p>"Loading payments..."</p> }>
            <ul class="payments">
                {move || {
                    payments
                        .get()
                        .map(|records| {
                            if records.is_empty() {
                                return view! { <li>"No payments recorded."</li> }.into_view();
                            }
                            records
                                .into_iter()
                                .map(|record| {
                                    let date = record.completed_at.format("%-m/%-d/%Y").to_string();
                                    view! {
                                        <li>
                                            "#" {record.installment_number} " " {record.kind} ": "
                                            {record.amount} " " {record.status} " via "
                                            {record.method} " on " {date}
                                        </li>
                                    }
                                })
                                .collect_view()
                        })
                }}
            </ul>
        </Suspense>
    }
}
