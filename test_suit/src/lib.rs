mod adapter;

use quarry::{Entity, Schema};

/// Writer of posts.
#[derive(Entity, Debug, Clone, Default)]
#[quarry(table = "authors")]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub karma: Option<i64>,
    #[quarry(array)]
    pub tags: Vec<String>,
    #[quarry(relation = "Post", many)]
    pub posts: Vec<Post>,
}

#[derive(Entity, Debug, Clone, Default)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub likes: i64,
    pub published: bool,
    pub author_id: i64,
    #[quarry(relation = "Author")]
    pub author: Option<Box<Author>>,
    #[quarry(skip)]
    pub draft_notes: String,
}

pub fn schema() -> quarry::Result<Schema> {
    Schema::new()
        .register::<Author>()
        .register::<Post>()
        .validate()
}
