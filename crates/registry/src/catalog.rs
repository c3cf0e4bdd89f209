//! The built-in adapter catalog.
//!
//! Each entry records exactly what the scaffolding templates emit for that
//! technology: owned files with their rendered content, npm dependencies,
//! environment variables, and fingerprint strings for detection.

use crate::{
    DatabaseFamily, DatabaseProfile, OwnedFile, TechnologyAdapter, TransformHook,
};
use common::Category;
use std::collections::{BTreeMap, BTreeSet};

fn deps(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(n, v)| (n.to_string(), v.to_string()))
        .collect()
}

fn env(keys: &[&str]) -> BTreeSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

fn keys(strs: &[&str]) -> Vec<String> {
    strs.iter().map(|s| s.to_string()).collect()
}

fn file(path: &str, template: &str) -> OwnedFile {
    OwnedFile {
        path: path.to_string(),
        template: template.to_string(),
    }
}

pub(crate) fn builtin_adapters() -> Vec<TechnologyAdapter> {
    let mut all = Vec::new();
    all.extend(auth_adapters());
    all.extend(database_adapters());
    all.extend(orm_adapters());
    all.extend(storage_adapters());
    all.extend(email_adapters());
    all
}

// ---------------------------------------------------------------------------
// auth
// ---------------------------------------------------------------------------

fn auth_adapters() -> Vec<TechnologyAdapter> {
    vec![
        TechnologyAdapter {
            category: Category::Auth,
            name: "clerk".into(),
            version: "5".into(),
            owned_files: vec![
                file(
                    "src/lib/auth/provider.ts",
                    "import { auth, currentUser } from \"@clerk/nextjs/server\";\n\
                     \n\
                     export async function getSession() {\n\
                     \x20 const { userId } = await auth();\n\
                     \x20 return userId ? { userId } : null;\n\
                     }\n\
                     \n\
                     export async function getUser() {\n\
                     \x20 return currentUser();\n\
                     }\n",
                ),
                file(
                    "src/middleware/clerk.ts",
                    "import { clerkMiddleware } from \"@clerk/nextjs/server\";\n\
                     \n\
                     export default clerkMiddleware();\n\
                     \n\
                     export const config = {\n\
                     \x20 matcher: [\"/((?!.*\\\\..*|_next).*)\", \"/\", \"/(api|trpc)(.*)\"],\n\
                     };\n",
                ),
            ],
            dependencies: deps(&[("@clerk/nextjs", "^5.0.0")]),
            env_vars: env(&["CLERK_SECRET_KEY", "NEXT_PUBLIC_CLERK_PUBLISHABLE_KEY"]),
            config_keys: keys(&["clerkMiddleware", "CLERK_SECRET_KEY", "@clerk/nextjs"]),
            database_profile: None,
            transform_hooks: Vec::new(),
        },
        TechnologyAdapter {
            category: Category::Auth,
            name: "workos".into(),
            version: "7".into(),
            owned_files: vec![
                file(
                    "src/lib/auth/provider.ts",
                    "import { WorkOS } from \"@workos-inc/node\";\n\
                     \n\
                     const workos = new WorkOS(process.env.WORKOS_API_KEY);\n\
                     \n\
                     export async function getSession() {\n\
                     \x20 const session = await workos.userManagement.loadSealedSession({\n\
                     \x20   sessionData: \"\",\n\
                     \x20   cookiePassword: process.env.WORKOS_COOKIE_PASSWORD ?? \"\",\n\
                     \x20 });\n\
                     \x20 return session;\n\
                     }\n",
                ),
                file(
                    "src/lib/auth/callback.ts",
                    "import { WorkOS } from \"@workos-inc/node\";\n\
                     \n\
                     const workos = new WorkOS(process.env.WORKOS_API_KEY);\n\
                     \n\
                     export async function handleCallback(code: string) {\n\
                     \x20 return workos.userManagement.authenticateWithCode({\n\
                     \x20   clientId: process.env.WORKOS_CLIENT_ID ?? \"\",\n\
                     \x20   code,\n\
                     \x20 });\n\
                     }\n",
                ),
            ],
            dependencies: deps(&[("@workos-inc/node", "^7.0.0")]),
            env_vars: env(&[
                "WORKOS_API_KEY",
                "WORKOS_CLIENT_ID",
                "WORKOS_COOKIE_PASSWORD",
            ]),
            config_keys: keys(&["WorkOS", "WORKOS_API_KEY", "@workos-inc/node"]),
            database_profile: None,
            transform_hooks: vec![TransformHook {
                name: "auth-import-rewrite".into(),
                file: "src/app/layout.tsx".into(),
                find: "@clerk/nextjs".into(),
                replace: "@workos-inc/node".into(),
            }],
        },
        TechnologyAdapter {
            category: Category::Auth,
            name: "auth0".into(),
            version: "4".into(),
            owned_files: vec![
                file(
                    "src/lib/auth/provider.ts",
                    "import { Auth0Client } from \"@auth0/nextjs-auth0/server\";\n\
                     \n\
                     export const auth0 = new Auth0Client();\n\
                     \n\
                     export async function getSession() {\n\
                     \x20 return auth0.getSession();\n\
                     }\n",
                ),
                file(
                    "src/middleware/auth0.ts",
                    "import type { NextRequest } from \"next/server\";\n\
                     import { auth0 } from \"../lib/auth/provider\";\n\
                     \n\
                     export async function middleware(request: NextRequest) {\n\
                     \x20 return auth0.middleware(request);\n\
                     }\n",
                ),
            ],
            dependencies: deps(&[("@auth0/nextjs-auth0", "^4.0.0")]),
            env_vars: env(&["AUTH0_SECRET", "AUTH0_DOMAIN", "AUTH0_CLIENT_ID"]),
            config_keys: keys(&["Auth0Client", "AUTH0_DOMAIN", "@auth0/nextjs-auth0"]),
            database_profile: None,
            transform_hooks: Vec::new(),
        },
    ]
}

// ---------------------------------------------------------------------------
// database
// ---------------------------------------------------------------------------

fn database_adapters() -> Vec<TechnologyAdapter> {
    vec![
        TechnologyAdapter {
            category: Category::Database,
            name: "neon".into(),
            version: "16".into(),
            owned_files: vec![
                file(
                    "src/lib/db/client.ts",
                    "import { neon } from \"@neondatabase/serverless\";\n\
                     \n\
                     export const sql = neon(process.env.DATABASE_URL ?? \"\");\n",
                ),
                file(
                    "src/lib/db/schema.ts",
                    "// Postgres schema served by Neon.\n\
                     export const tables = {\n\
                     \x20 users: \"users\",\n\
                     \x20 posts: \"posts\",\n\
                     };\n",
                ),
            ],
            dependencies: deps(&[("@neondatabase/serverless", "^0.10.0")]),
            env_vars: env(&["DATABASE_URL"]),
            config_keys: keys(&["@neondatabase/serverless", "neon("]),
            database_profile: Some(DatabaseProfile {
                family: DatabaseFamily::Relational,
                row_level_security: false,
                lossy_import: false,
            }),
            transform_hooks: Vec::new(),
        },
        TechnologyAdapter {
            category: Category::Database,
            name: "planetscale".into(),
            version: "8".into(),
            owned_files: vec![
                file(
                    "src/lib/db/client.ts",
                    "import { connect } from \"@planetscale/database\";\n\
                     \n\
                     export const db = connect({\n\
                     \x20 host: process.env.DATABASE_HOST,\n\
                     \x20 username: process.env.DATABASE_USERNAME,\n\
                     \x20 password: process.env.DATABASE_PASSWORD,\n\
                     });\n",
                ),
                file(
                    "src/lib/db/schema.ts",
                    "// MySQL schema served by PlanetScale. Foreign keys are enforced\n\
                     // in the application layer, not the database.\n\
                     export const tables = {\n\
                     \x20 users: \"users\",\n\
                     \x20 posts: \"posts\",\n\
                     };\n",
                ),
            ],
            dependencies: deps(&[("@planetscale/database", "^1.19.0")]),
            env_vars: env(&["DATABASE_HOST", "DATABASE_USERNAME", "DATABASE_PASSWORD"]),
            config_keys: keys(&["@planetscale/database", "DATABASE_HOST"]),
            database_profile: Some(DatabaseProfile {
                family: DatabaseFamily::Relational,
                row_level_security: false,
                // PlanetScale imports do not carry foreign-key constraints.
                lossy_import: true,
            }),
            transform_hooks: Vec::new(),
        },
        TechnologyAdapter {
            category: Category::Database,
            name: "supabase".into(),
            version: "2".into(),
            owned_files: vec![
                file(
                    "src/lib/db/client.ts",
                    "import { createClient } from \"@supabase/supabase-js\";\n\
                     \n\
                     export const supabase = createClient(\n\
                     \x20 process.env.SUPABASE_URL ?? \"\",\n\
                     \x20 process.env.SUPABASE_ANON_KEY ?? \"\",\n\
                     );\n",
                ),
                file(
                    "src/lib/db/schema.ts",
                    "// Postgres schema served by Supabase. Row-level security policies\n\
                     // are defined per table in the Supabase dashboard.\n\
                     export const tables = {\n\
                     \x20 users: \"users\",\n\
                     \x20 posts: \"posts\",\n\
                     };\n",
                ),
            ],
            dependencies: deps(&[("@supabase/supabase-js", "^2.45.0")]),
            env_vars: env(&["SUPABASE_URL", "SUPABASE_ANON_KEY"]),
            config_keys: keys(&["@supabase/supabase-js", "SUPABASE_URL"]),
            database_profile: Some(DatabaseProfile {
                family: DatabaseFamily::Relational,
                row_level_security: true,
                lossy_import: false,
            }),
            transform_hooks: Vec::new(),
        },
        TechnologyAdapter {
            category: Category::Database,
            name: "mongodb".into(),
            version: "6".into(),
            owned_files: vec![
                file(
                    "src/lib/db/client.ts",
                    "import { MongoClient } from \"mongodb\";\n\
                     \n\
                     const client = new MongoClient(process.env.MONGODB_URI ?? \"\");\n\
                     export const db = client.db();\n",
                ),
                file(
                    "src/lib/db/schema.ts",
                    "// Document collections. No relational schema; shapes are validated\n\
                     // at the application boundary.\n\
                     export const collections = {\n\
                     \x20 users: \"users\",\n\
                     \x20 posts: \"posts\",\n\
                     };\n",
                ),
            ],
            dependencies: deps(&[("mongodb", "^6.8.0")]),
            env_vars: env(&["MONGODB_URI"]),
            config_keys: keys(&["MongoClient", "MONGODB_URI"]),
            database_profile: Some(DatabaseProfile {
                family: DatabaseFamily::Document,
                row_level_security: false,
                lossy_import: true,
            }),
            transform_hooks: Vec::new(),
        },
    ]
}

// ---------------------------------------------------------------------------
// orm
// ---------------------------------------------------------------------------

fn orm_adapters() -> Vec<TechnologyAdapter> {
    vec![
        TechnologyAdapter {
            category: Category::Orm,
            name: "prisma".into(),
            version: "5".into(),
            owned_files: vec![
                file(
                    "prisma/schema.prisma",
                    "generator client {\n\
                     \x20 provider = \"prisma-client-js\"\n\
                     }\n\
                     \n\
                     datasource db {\n\
                     \x20 provider = \"postgresql\"\n\
                     \x20 url      = env(\"DATABASE_URL\")\n\
                     }\n\
                     \n\
                     model User {\n\
                     \x20 id    String @id @default(cuid())\n\
                     \x20 email String @unique\n\
                     }\n",
                ),
                file(
                    "src/lib/orm/client.ts",
                    "import { PrismaClient } from \"@prisma/client\";\n\
                     \n\
                     export const orm = new PrismaClient();\n",
                ),
            ],
            dependencies: deps(&[("prisma", "^5.18.0"), ("@prisma/client", "^5.18.0")]),
            env_vars: env(&["DATABASE_URL"]),
            config_keys: keys(&["PrismaClient", "schema.prisma", "@prisma/client"]),
            database_profile: None,
            transform_hooks: Vec::new(),
        },
        TechnologyAdapter {
            category: Category::Orm,
            name: "drizzle".into(),
            version: "0.33".into(),
            owned_files: vec![
                file(
                    "drizzle.config.ts",
                    "import { defineConfig } from \"drizzle-kit\";\n\
                     \n\
                     export default defineConfig({\n\
                     \x20 schema: \"./src/lib/orm/schema.ts\",\n\
                     \x20 dialect: \"postgresql\",\n\
                     \x20 dbCredentials: { url: process.env.DATABASE_URL ?? \"\" },\n\
                     });\n",
                ),
                file(
                    "src/lib/orm/client.ts",
                    "import { drizzle } from \"drizzle-orm/node-postgres\";\n\
                     \n\
                     export const orm = drizzle(process.env.DATABASE_URL ?? \"\");\n",
                ),
            ],
            dependencies: deps(&[("drizzle-orm", "^0.33.0"), ("drizzle-kit", "^0.24.0")]),
            env_vars: env(&["DATABASE_URL"]),
            config_keys: keys(&["drizzle-orm", "drizzle-kit", "defineConfig"]),
            database_profile: None,
            transform_hooks: Vec::new(),
        },
    ]
}

// ---------------------------------------------------------------------------
// storage
// ---------------------------------------------------------------------------

fn storage_adapters() -> Vec<TechnologyAdapter> {
    vec![
        TechnologyAdapter {
            category: Category::Storage,
            name: "s3".into(),
            version: "3".into(),
            owned_files: vec![file(
                "src/lib/storage/client.ts",
                "import { S3Client } from \"@aws-sdk/client-s3\";\n\
                 \n\
                 export const storage = new S3Client({\n\
                 \x20 region: process.env.AWS_REGION ?? \"us-east-1\",\n\
                 });\n\
                 \n\
                 export const bucket = process.env.S3_BUCKET ?? \"\";\n",
            )],
            dependencies: deps(&[("@aws-sdk/client-s3", "^3.620.0")]),
            env_vars: env(&[
                "AWS_ACCESS_KEY_ID",
                "AWS_SECRET_ACCESS_KEY",
                "AWS_REGION",
                "S3_BUCKET",
            ]),
            config_keys: keys(&["S3Client", "S3_BUCKET"]),
            database_profile: None,
            transform_hooks: Vec::new(),
        },
        TechnologyAdapter {
            category: Category::Storage,
            name: "r2".into(),
            version: "3".into(),
            owned_files: vec![file(
                "src/lib/storage/client.ts",
                "import { S3Client } from \"@aws-sdk/client-s3\";\n\
                 \n\
                 // Cloudflare R2 speaks the S3 protocol with an account endpoint.\n\
                 export const storage = new S3Client({\n\
                 \x20 region: \"auto\",\n\
                 \x20 endpoint: `https://${process.env.R2_ACCOUNT_ID}.r2.cloudflarestorage.com`,\n\
                 });\n\
                 \n\
                 export const bucket = process.env.R2_BUCKET ?? \"\";\n",
            )],
            dependencies: deps(&[("@aws-sdk/client-s3", "^3.620.0")]),
            env_vars: env(&[
                "R2_ACCOUNT_ID",
                "R2_ACCESS_KEY_ID",
                "R2_SECRET_ACCESS_KEY",
                "R2_BUCKET",
            ]),
            config_keys: keys(&["r2.cloudflarestorage.com", "R2_BUCKET"]),
            database_profile: None,
            transform_hooks: Vec::new(),
        },
    ]
}

// ---------------------------------------------------------------------------
// email
// ---------------------------------------------------------------------------

fn email_adapters() -> Vec<TechnologyAdapter> {
    vec![
        TechnologyAdapter {
            category: Category::Email,
            name: "resend".into(),
            version: "4".into(),
            owned_files: vec![file(
                "src/lib/email/client.ts",
                "import { Resend } from \"resend\";\n\
                 \n\
                 export const mailer = new Resend(process.env.RESEND_API_KEY);\n",
            )],
            dependencies: deps(&[("resend", "^4.0.0")]),
            env_vars: env(&["RESEND_API_KEY"]),
            config_keys: keys(&["Resend", "RESEND_API_KEY"]),
            database_profile: None,
            transform_hooks: Vec::new(),
        },
        TechnologyAdapter {
            category: Category::Email,
            name: "sendgrid".into(),
            version: "8".into(),
            owned_files: vec![file(
                "src/lib/email/client.ts",
                "import sgMail from \"@sendgrid/mail\";\n\
                 \n\
                 sgMail.setApiKey(process.env.SENDGRID_API_KEY ?? \"\");\n\
                 \n\
                 export const mailer = sgMail;\n",
            )],
            dependencies: deps(&[("@sendgrid/mail", "^8.1.0")]),
            env_vars: env(&["SENDGRID_API_KEY"]),
            config_keys: keys(&["@sendgrid/mail", "SENDGRID_API_KEY"]),
            database_profile: None,
            transform_hooks: Vec::new(),
        },
        TechnologyAdapter {
            category: Category::Email,
            name: "postmark".into(),
            version: "4".into(),
            owned_files: vec![file(
                "src/lib/email/client.ts",
                "import { ServerClient } from \"postmark\";\n\
                 \n\
                 export const mailer = new ServerClient(\n\
                 \x20 process.env.POSTMARK_SERVER_TOKEN ?? \"\",\n\
                 );\n",
            )],
            dependencies: deps(&[("postmark", "^4.0.0")]),
            env_vars: env(&["POSTMARK_SERVER_TOKEN"]),
            config_keys: keys(&["ServerClient", "POSTMARK_SERVER_TOKEN"]),
            database_profile: None,
            transform_hooks: Vec::new(),
        },
    ]
}
