use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::{
    book::{Book, BookStatus, BookView},
    order::{Order, OrderStatus, OrderSummary},
    user::{Role, User, UserProfile},
    PageQuery, Pagination,
};

const RECENT_ROWS: usize = 5;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    /// Non-admin accounts only.
    pub total_users: usize,
    pub total_books: usize,
    pub total_orders: usize,
    pub pending_approvals: usize,
    /// Sum of `finalAmount` over processing, shipped and delivered orders.
    pub total_revenue: u64,
    pub books_by_status: BTreeMap<String, usize>,
    pub orders_by_status: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentBook {
    pub id: String,
    pub title: String,
    pub author: String,
    pub status: BookStatus,
    pub selling_price: u64,
    pub seller_name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminDashboard {
    pub stats: AdminStats,
    pub recent_users: Vec<RecentUser>,
    pub recent_books: Vec<RecentBook>,
    pub recent_orders: Vec<OrderSummary>,
}

fn counts_by<T, K: ToString>(items: &[T], key: impl Fn(&T) -> K) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for item in items {
        *out.entry(key(item).to_string()).or_insert(0) += 1;
    }
    out
}

impl AdminDashboard {
    pub fn build(mut users: Vec<User>, mut books: Vec<Book>, mut orders: Vec<Order>) -> Self {
        users.retain(|u| u.role == Role::User);
        let revenue = orders
            .iter()
            .filter(|o| {
                matches!(
                    o.order_status,
                    OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Delivered
                )
            })
            .map(|o| o.final_amount)
            .sum();

        let stats = AdminStats {
            total_users: users.len(),
            total_books: books.len(),
            total_orders: orders.len(),
            pending_approvals: books
                .iter()
                .filter(|b| b.status == BookStatus::Pending)
                .count(),
            total_revenue: revenue,
            books_by_status: counts_by(&books, |b| b.status),
            orders_by_status: counts_by(&orders, |o| o.order_status),
        };

        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        books.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        super::order::sort_orders(&mut orders);

        Self {
            stats,
            recent_users: users
                .iter()
                .take(RECENT_ROWS)
                .map(|u| RecentUser {
                    id: u.id.clone(),
                    name: u.name.clone(),
                    email: u.email.clone(),
                    is_active: u.is_active,
                    created_at: u.created_at,
                })
                .collect(),
            recent_books: books
                .iter()
                .take(RECENT_ROWS)
                .map(|b| RecentBook {
                    id: b.id.clone(),
                    title: b.title.clone(),
                    author: b.author.clone(),
                    status: b.status,
                    selling_price: b.selling_price,
                    seller_name: b.seller_info.name.clone(),
                    created_at: b.created_at,
                })
                .collect(),
            recent_orders: orders.iter().take(RECENT_ROWS).map(OrderSummary::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct UserListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<AccountStatus>,
    /// Matches name or e-mail.
    pub search: Option<String>,
}

impl UserListQuery {
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            page: self.page,
            limit: self.limit,
        }
    }

    pub fn matches(&self, user: &User) -> bool {
        user.role == Role::User
            && self.status.map_or(true, |s| match s {
                AccountStatus::Active => user.is_active,
                AccountStatus::Inactive => !user.is_active,
            })
            && self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map_or(true, |s| user_matches(user, s))
    }
}

/// Case-insensitive substring match on name or e-mail.
pub fn user_matches(user: &User, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    user.name.to_lowercase().contains(&needle) || user.email.to_lowercase().contains(&needle)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserList {
    pub users: Vec<UserProfile>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserDetail {
    pub user: UserProfile,
    pub listings: Vec<BookView>,
    pub purchases: Vec<OrderSummary>,
    pub sales: Vec<OrderSummary>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusRequest {
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        book::{tests::sample_request, DeliveryMethod},
        order::{CreateOrderRequest, PaymentMethod},
    };

    fn user(id: &str, role: Role) -> User {
        User::new(
            id.to_string(),
            format!("Name {id}"),
            format!("{id}@example.com"),
            "h".to_string(),
            role,
        )
    }

    fn order(book: &Book, status: OrderStatus) -> Order {
        let mut o = Order::place(
            "buyer",
            book,
            CreateOrderRequest {
                book_id: book.id.clone(),
                quantity: Some(1),
                payment_method: PaymentMethod::OnlinePayment,
                delivery_method: DeliveryMethod::Delivery,
                delivery_address: None,
                meetup_location: None,
                notes: None,
            },
            "ORD".to_string(),
        )
        .unwrap();
        if status == OrderStatus::Cancelled {
            o.cancel("buyer", None).unwrap();
        } else if status != OrderStatus::Placed {
            o.advance("seller", status, None, None).unwrap();
        }
        o
    }

    #[test]
    fn dashboard_counts_and_revenue() {
        let seller = user("seller", Role::User);
        let mut approved = Book::new_from_request(&seller, sample_request(), Vec::new());
        approved.status = BookStatus::Approved;
        let pending = Book::new_from_request(&seller, sample_request(), Vec::new());

        let orders = vec![
            order(&approved, OrderStatus::Placed),
            order(&approved, OrderStatus::Shipped),
            order(&approved, OrderStatus::Delivered),
            order(&approved, OrderStatus::Cancelled),
        ];
        let users = vec![
            seller.clone(),
            user("buyer", Role::User),
            user("root", Role::Admin),
        ];

        let d = AdminDashboard::build(users, vec![approved, pending], orders);
        assert_eq!(d.stats.total_users, 2);
        assert_eq!(d.stats.total_books, 2);
        assert_eq!(d.stats.pending_approvals, 1);
        assert_eq!(d.stats.total_orders, 4);
        // two counted orders at 250 + 100 delivery each
        assert_eq!(d.stats.total_revenue, 700);
        assert_eq!(d.stats.orders_by_status.get("cancelled"), Some(&1));
        assert_eq!(d.stats.books_by_status.get("approved"), Some(&1));
        assert!(d.recent_users.iter().all(|u| u.id != "root"));
    }

    #[test]
    fn user_filter_excludes_admins() {
        let mut inactive = user("asha", Role::User);
        inactive.is_active = false;
        let q = UserListQuery {
            status: Some(AccountStatus::Inactive),
            search: Some("ASHA".to_string()),
            ..Default::default()
        };
        assert!(q.matches(&inactive));
        assert!(!q.matches(&user("asha2", Role::User)));
        assert!(!UserListQuery::default().matches(&user("root", Role::Admin)));
    }
}
