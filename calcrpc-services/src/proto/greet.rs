//! Messages of `greet.GreetService`.
//!
//! JSON field names are camelCase and missing fields take their default,
//! matching protobuf's JSON mapping.

use serde::{Deserialize, Serialize};

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Greeting {
    #[prost(string, tag = "1")]
    pub first_name: String,
    #[prost(string, tag = "2")]
    pub last_name: String,
}

impl Greeting {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
        }
    }
}

macro_rules! greeting_request {
    ($($name:ident),+ $(,)?) => {$(
        #[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase", default)]
        pub struct $name {
            #[prost(message, optional, tag = "1")]
            pub greeting: Option<Greeting>,
        }

        impl $name {
            pub fn new(greeting: Greeting) -> Self {
                Self { greeting: Some(greeting) }
            }

            /// First name of the greeting, empty when absent.
            pub fn first_name(&self) -> &str {
                self.greeting.as_ref().map_or("", |g| g.first_name.as_str())
            }
        }
    )+};
}

macro_rules! result_response {
    ($($name:ident),+ $(,)?) => {$(
        #[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase", default)]
        pub struct $name {
            #[prost(string, tag = "1")]
            pub result: String,
        }
    )+};
}

greeting_request!(
    GreetRequest,
    GreetManyTimesRequest,
    LongGreetRequest,
    GreetEveryoneRequest,
    GreetWithDeadlineRequest,
);

result_response!(
    GreetResponse,
    GreetManyTimesResponse,
    LongGreetResponse,
    GreetEveryoneResponse,
    GreetWithDeadlineResponse,
);
