mod entity;
mod shared;

use proc_macro::TokenStream;

/// Implements `quarry::schema::Entity` from the struct layout.
///
/// ```ignore
/// #[derive(Entity)]
/// #[quarry(table = "users")]
/// struct User {
///     id: Uuid,
///     name: String,
///     #[quarry(array)]
///     labels: Vec<String>,
///     #[quarry(relation = "Photo", many)]
///     photos: Vec<Photo>,
///     #[quarry(relation = "Company", local = "employer_id")]
///     company: Option<Company>,
///     #[quarry(skip)]
///     scratch: String,
/// }
/// ```
///
/// Struct options: `name` (defaults to the type name), `table` (snake case
/// plural of the name) and `primary_key` (`id`).
///
/// A `many` relation joins `Target.<entity>_id` to the primary key; a `one`
/// relation (the default) joins `Target.id` to `<field>_id`. `local` and
/// `foreign` override either side.
#[proc_macro_derive(Entity, attributes(quarry))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    entity::derive(input)
}
