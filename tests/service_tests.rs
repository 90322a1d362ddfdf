use async_trait::async_trait;
use quill_backend::{
    AppError, CommentService, MemoryRepository, PostService, UserService,
    models::{
        Comment, CreateCommentRequest, CreatePostRequest, NewPost, NewUser, Post, PostChanges,
        PostFilter, ProfileChanges, Role, Tag, UpdateCommentRequest, UpdatePostRequest,
        UpdateProfileRequest, User, UserCredentials,
    },
    password,
    repository::{Repository, RepositoryState, StoreResult},
    services::posts::find_or_create_tag,
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use uuid::Uuid;

// --- Fixtures ---

struct Fixture {
    repo: RepositoryState,
    posts: PostService,
    comments: CommentService,
    users: UserService,
}

fn fixture() -> Fixture {
    let repo: RepositoryState = Arc::new(MemoryRepository::new());
    Fixture {
        posts: PostService::new(repo.clone()),
        comments: CommentService::new(repo.clone()),
        users: UserService::new(repo.clone()),
        repo,
    }
}

async fn seed_user(repo: &RepositoryState, name: &str, email: &str) -> User {
    repo.create_user(NewUser {
        name: name.to_string(),
        email: email.to_string(),
        username: None,
        password_hash: password::hash_password("secret1").unwrap(),
        role: Role::Member,
    })
    .await
    .unwrap()
}

fn post_request(title: &str, tags: &[&str]) -> CreatePostRequest {
    CreatePostRequest {
        title: title.to_string(),
        content: Some(format!("{} body", title)),
        tags: Some(tags.iter().map(|t| t.to_string()).collect()),
    }
}

fn tag_names(post: &Post) -> Vec<String> {
    let mut names: Vec<String> = post.tags.iter().map(|t| t.name.clone()).collect();
    names.sort();
    names
}

// --- Posts ---

#[tokio::test]
async fn test_tags_are_reused_across_authors() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;
    let bob = seed_user(&f.repo, "Bob", "bob@example.com").await;

    let first = f.posts.create_post(ada.id, post_request("One", &["rust"])).await.unwrap();
    let second = f
        .posts
        .create_post(bob.id, post_request("Two", &["rust", "web"]))
        .await
        .unwrap();

    let rust_first = first.tags.iter().find(|t| t.name == "rust").unwrap();
    let rust_second = second.tags.iter().find(|t| t.name == "rust").unwrap();
    assert_eq!(rust_first.id, rust_second.id);
    assert_eq!(tag_names(&second), vec!["rust", "web"]);
}

#[tokio::test]
async fn test_tag_names_are_trimmed_and_deduplicated() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;

    let post = f
        .posts
        .create_post(ada.id, post_request("One", &[" rust ", "rust", "", "  "]))
        .await
        .unwrap();

    assert_eq!(tag_names(&post), vec!["rust"]);
}

#[tokio::test]
async fn test_create_post_populates_relations() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;

    let post = f.posts.create_post(ada.id, post_request("Hello", &[])).await.unwrap();

    assert_eq!(post.title, "Hello");
    assert_eq!(post.author_id, ada.id);
    assert_eq!(post.author.name, "Ada");
    assert!(post.tags.is_empty());
    assert!(post.comments.is_empty());
    assert_eq!(post.comment_count, 0);
}

#[tokio::test]
async fn test_create_post_for_unknown_author_is_not_found() {
    let f = fixture();
    let result = f
        .posts
        .create_post(Uuid::new_v4(), post_request("Orphan", &[]))
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_get_missing_post_is_not_found() {
    let f = fixture();
    assert!(matches!(f.posts.get_post(42).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_update_post_replaces_tags_and_keeps_unsent_fields() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;
    let post = f
        .posts
        .create_post(ada.id, post_request("Original", &["a", "b"]))
        .await
        .unwrap();

    let updated = f
        .posts
        .update_post(
            post.id,
            UpdatePostRequest {
                tags: Some(vec!["c".to_string()]),
                ..Default::default()
            },
            ada.id,
        )
        .await
        .unwrap();

    assert_eq!(updated.title, "Original");
    assert_eq!(updated.content.as_deref(), Some("Original body"));
    assert_eq!(tag_names(&updated), vec!["c"]);
}

#[tokio::test]
async fn test_update_post_with_empty_tags_clears_them() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;
    let post = f.posts.create_post(ada.id, post_request("P", &["a"])).await.unwrap();

    let updated = f
        .posts
        .update_post(
            post.id,
            UpdatePostRequest {
                title: Some("Renamed".to_string()),
                tags: Some(vec![]),
                ..Default::default()
            },
            ada.id,
        )
        .await
        .unwrap();

    assert_eq!(updated.title, "Renamed");
    assert!(updated.tags.is_empty());
}

#[tokio::test]
async fn test_only_author_may_change_post() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;
    let bob = seed_user(&f.repo, "Bob", "bob@example.com").await;
    let post = f.posts.create_post(ada.id, post_request("Mine", &[])).await.unwrap();

    let update = f
        .posts
        .update_post(post.id, UpdatePostRequest::default(), bob.id)
        .await;
    assert!(matches!(update, Err(AppError::Forbidden(_))));

    let delete = f.posts.delete_post(post.id, bob.id).await;
    assert!(matches!(delete, Err(AppError::Forbidden(_))));

    assert!(f.posts.get_post(post.id).await.is_ok());
}

#[tokio::test]
async fn test_delete_post_twice_is_not_found() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;
    let post = f.posts.create_post(ada.id, post_request("Gone", &[])).await.unwrap();

    f.posts.delete_post(post.id, ada.id).await.unwrap();
    assert!(matches!(
        f.posts.delete_post(post.id, ada.id).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_filters_and_ordering() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;
    let bob = seed_user(&f.repo, "Bob", "bob@example.com").await;

    let p1 = f.posts.create_post(ada.id, post_request("P1", &["rust"])).await.unwrap();
    let p2 = f.posts.create_post(bob.id, post_request("P2", &["go"])).await.unwrap();
    let p3 = f.posts.create_post(ada.id, post_request("P3", &["go"])).await.unwrap();

    let all: Vec<i64> = f
        .posts
        .list_posts(PostFilter::All)
        .await
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(all, vec![p3.id, p2.id, p1.id]);

    let by_ada: Vec<i64> = f
        .posts
        .list_posts(PostFilter::Author(ada.id))
        .await
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(by_ada, vec![p3.id, p1.id]);

    let tagged_go: Vec<i64> = f
        .posts
        .list_posts(PostFilter::Tag("go".to_string()))
        .await
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(tagged_go, vec![p3.id, p2.id]);

    let unknown = f
        .posts
        .list_posts(PostFilter::Tag("cobol".to_string()))
        .await
        .unwrap();
    assert!(unknown.is_empty());
}

// --- Comments ---

#[tokio::test]
async fn test_comment_lifecycle_and_count() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;
    let bob = seed_user(&f.repo, "Bob", "bob@example.com").await;
    let post = f.posts.create_post(ada.id, post_request("P", &[])).await.unwrap();

    let comment = f
        .comments
        .create_comment(
            post.id,
            bob.id,
            CreateCommentRequest {
                content: "Nice".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(comment.author.name, "Bob");

    let reloaded = f.posts.get_post(post.id).await.unwrap();
    assert_eq!(reloaded.comment_count, 1);
    assert_eq!(reloaded.comments[0].content, "Nice");

    let edited = f
        .comments
        .update_comment(
            post.id,
            comment.id,
            UpdateCommentRequest {
                content: Some("Very nice".to_string()),
            },
            bob.id,
        )
        .await
        .unwrap();
    assert_eq!(edited.content, "Very nice");

    f.comments.delete_comment(post.id, comment.id, bob.id).await.unwrap();
    assert_eq!(f.posts.get_post(post.id).await.unwrap().comment_count, 0);
}

#[tokio::test]
async fn test_comment_on_missing_post_is_not_found() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;

    let result = f
        .comments
        .create_comment(
            999,
            ada.id,
            CreateCommentRequest {
                content: "Hello?".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_comment_ownership_is_enforced() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;
    let bob = seed_user(&f.repo, "Bob", "bob@example.com").await;
    let post = f.posts.create_post(ada.id, post_request("P", &[])).await.unwrap();
    let comment = f
        .comments
        .create_comment(
            post.id,
            bob.id,
            CreateCommentRequest {
                content: "Bob's".to_string(),
            },
        )
        .await
        .unwrap();

    // The post's author has no say over other people's comments.
    match f
        .comments
        .update_comment(post.id, comment.id, UpdateCommentRequest::default(), ada.id)
        .await
    {
        Err(AppError::Forbidden(msg)) => assert_eq!(msg, "You can only edit your own comments!"),
        other => panic!("expected Forbidden, got {:?}", other),
    }

    match f.comments.delete_comment(post.id, comment.id, ada.id).await {
        Err(AppError::Forbidden(msg)) => assert_eq!(msg, "You can only delete your own comments!"),
        other => panic!("expected Forbidden, got {:?}", other),
    }
}

#[tokio::test]
async fn test_comment_addressed_through_other_post_is_not_found() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;
    let first = f.posts.create_post(ada.id, post_request("A", &[])).await.unwrap();
    let second = f.posts.create_post(ada.id, post_request("B", &[])).await.unwrap();
    let comment = f
        .comments
        .create_comment(
            first.id,
            ada.id,
            CreateCommentRequest {
                content: "On A".to_string(),
            },
        )
        .await
        .unwrap();

    let result = f.comments.delete_comment(second.id, comment.id, ada.id).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    // Missing comment also wins over the ownership check.
    let result = f.comments.delete_comment(first.id, 12345, ada.id).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));
}

// --- Users ---

#[tokio::test]
async fn test_update_profile_rehashes_password() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;

    let updated = f
        .users
        .update_profile(
            ada.id,
            UpdateProfileRequest {
                name: Some("Ada L.".to_string()),
                password: Some("brand-new".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "Ada L.");
    assert_eq!(updated.role, Role::Member);

    let creds = f
        .repo
        .find_credentials_by_email("ada@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(password::verify_password("brand-new", &creds.password_hash).unwrap());
    assert!(!password::verify_password("secret1", &creds.password_hash).unwrap());
}

#[tokio::test]
async fn test_update_profile_to_taken_email_conflicts() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;
    seed_user(&f.repo, "Bob", "bob@example.com").await;

    let result = f
        .users
        .update_profile(
            ada.id,
            UpdateProfileRequest {
                email: Some("bob@example.com".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_delete_user_cascades_and_second_delete_is_not_found() {
    let f = fixture();
    let ada = seed_user(&f.repo, "Ada", "ada@example.com").await;
    let post = f.posts.create_post(ada.id, post_request("P", &["kept"])).await.unwrap();

    f.users.delete_user(ada.id).await.unwrap();

    assert!(matches!(f.posts.get_post(post.id).await, Err(AppError::NotFound(_))));
    assert!(matches!(f.users.get_user(ada.id).await, Err(AppError::NotFound(_))));
    assert!(matches!(f.users.delete_user(ada.id).await, Err(AppError::NotFound(_))));

    // Tags outlive the posts that used them.
    assert!(f.repo.find_tag("kept").await.unwrap().is_some());
}

// --- Tag find-or-create retry ---

/// Wraps the memory store and hides existing tags from the first `misses` lookups, the way
/// a concurrent writer committing between our lookup and insert would.
struct RacingTagRepo {
    inner: MemoryRepository,
    misses: AtomicUsize,
}

#[async_trait]
impl Repository for RacingTagRepo {
    async fn find_credentials_by_email(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        self.inner.find_credentials_by_email(email).await
    }
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.inner.get_user(id).await
    }
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.inner.list_users().await
    }
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        self.inner.create_user(user).await
    }
    async fn update_user(&self, id: Uuid, changes: ProfileChanges) -> StoreResult<Option<User>> {
        self.inner.update_user(id, changes).await
    }
    async fn delete_user(&self, id: Uuid) -> StoreResult<bool> {
        self.inner.delete_user(id).await
    }
    async fn find_tag(&self, name: &str) -> StoreResult<Option<Tag>> {
        let hide = self
            .misses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if hide {
            return Ok(None);
        }
        self.inner.find_tag(name).await
    }
    async fn insert_tag(&self, name: &str) -> StoreResult<Tag> {
        self.inner.insert_tag(name).await
    }
    async fn list_posts(&self, filter: PostFilter) -> StoreResult<Vec<Post>> {
        self.inner.list_posts(filter).await
    }
    async fn get_post(&self, id: i64) -> StoreResult<Option<Post>> {
        self.inner.get_post(id).await
    }
    async fn create_post(&self, post: NewPost) -> StoreResult<Post> {
        self.inner.create_post(post).await
    }
    async fn update_post(&self, id: i64, changes: PostChanges) -> StoreResult<Option<Post>> {
        self.inner.update_post(id, changes).await
    }
    async fn delete_post(&self, id: i64) -> StoreResult<bool> {
        self.inner.delete_post(id).await
    }
    async fn get_comment(&self, id: i64) -> StoreResult<Option<Comment>> {
        self.inner.get_comment(id).await
    }
    async fn create_comment(&self, post_id: i64, author_id: Uuid, content: String) -> StoreResult<Comment> {
        self.inner.create_comment(post_id, author_id, content).await
    }
    async fn update_comment(&self, id: i64, content: Option<String>) -> StoreResult<Option<Comment>> {
        self.inner.update_comment(id, content).await
    }
    async fn delete_comment(&self, id: i64) -> StoreResult<bool> {
        self.inner.delete_comment(id).await
    }
}

async fn racing_repo(misses: usize) -> (RacingTagRepo, Tag) {
    let inner = MemoryRepository::new();
    let winner = inner.insert_tag("rust").await.unwrap();
    let repo = RacingTagRepo {
        inner,
        misses: AtomicUsize::new(misses),
    };
    (repo, winner)
}

#[tokio::test]
async fn test_lost_insert_race_resolves_to_winning_tag() {
    let (repo, winner) = racing_repo(1).await;
    let tag = find_or_create_tag(&repo, "rust").await.unwrap();
    assert_eq!(tag, winner);
}

#[tokio::test]
async fn test_persistent_race_gives_up_with_conflict() {
    let (repo, _) = racing_repo(10).await;
    let result = find_or_create_tag(&repo, "rust").await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}
